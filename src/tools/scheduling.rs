use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{remote_failure, DynTool, Tool, ToolError, ToolOutput};
use crate::services::{BusyInterval, CalendarService, NewEvent, Services};

const CALENDAR_UNAVAILABLE: &str = "Calendar service not available.";
const SEARCH_DAYS: i64 = 7;

pub fn tools(services: &Services) -> Vec<Arc<dyn DynTool>> {
    vec![Arc::new(ScheduleMeeting { calendar: services.calendar.clone() })]
}

/// Earliest `duration`-long slot starting at or after `now` that overlaps no
/// busy interval and ends by `horizon`.
///
/// Each conflict moves the candidate to the latest end among the intervals
/// starting before the candidate's end, so `busy` need not be sorted.
pub fn find_free_slot(
    now: DateTime<Utc>,
    duration: Duration,
    busy: &[BusyInterval],
    horizon: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let mut start = now;
    loop {
        let end = start + duration;
        if end > horizon {
            return None;
        }

        let free = busy.iter().all(|b| start.max(b.start) >= end.min(b.end));
        if free {
            return Some(start);
        }

        match busy.iter().filter(|b| b.start < end).map(|b| b.end).max() {
            Some(next) if next > start => start = next,
            _ => return Some(start),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleMeetingParams {
    pub title: String,
    pub duration_minutes: u32,
    #[serde(default)]
    pub attendees: Option<Vec<String>>,
}

pub struct ScheduleMeeting {
    calendar: Option<Arc<dyn CalendarService>>,
}

#[async_trait]
impl Tool for ScheduleMeeting {
    type Params = ScheduleMeetingParams;

    fn id(&self) -> &'static str {
        "schedule_meeting"
    }

    fn description(&self) -> &'static str {
        "Schedules a meeting in the user's primary Google Calendar at the next available time slot."
    }

    async fn run(&self, params: ScheduleMeetingParams) -> Result<ToolOutput, ToolError> {
        let Some(calendar) = &self.calendar else {
            return Ok(ToolOutput::message(CALENDAR_UNAVAILABLE));
        };

        let now = Utc::now();
        let horizon = now + Duration::days(SEARCH_DAYS);
        let busy = match calendar.busy_intervals(now, horizon).await {
            Ok(busy) => busy,
            Err(e) => return remote_failure("An error occurred with Google Calendar API", e),
        };

        let duration = Duration::minutes(i64::from(params.duration_minutes));
        let Some(start) = find_free_slot(now, duration, &busy, horizon) else {
            log::warn!("Calendar: no free slot for '{}' in {} busy intervals", params.title, busy.len());
            return Ok(ToolOutput::message(format!(
                "No free {}-minute slot found in the next {} days.",
                params.duration_minutes, SEARCH_DAYS
            )));
        };

        let event = NewEvent {
            summary: params.title.clone(),
            start,
            end: start + duration,
            attendees: params.attendees.unwrap_or_default(),
        };
        match calendar.insert_event(&event).await {
            Ok(link) => Ok(ToolOutput::message(format!(
                "Successfully scheduled '{}' at {} UTC. Link: {}",
                params.title,
                start.format("%H:%M"),
                link
            ))),
            Err(e) => remote_failure("An error occurred with Google Calendar API", e),
        }
    }
}
