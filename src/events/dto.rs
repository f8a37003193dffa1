use serde::{Deserialize, Serialize};
use time::{
    format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime,
    PrimitiveDateTime,
};
use uuid::Uuid;

use super::repo_types::{Event, EventFields};
use crate::error::ApiError;

const MAX_TITLE_LEN: usize = 200;

#[derive(Debug, Serialize)]
pub struct EventItem {
    pub id: Uuid,
    pub title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end: OffsetDateTime,
}

impl From<Event> for EventItem {
    fn from(e: Event) -> Self {
        Self {
            id: e.id,
            title: e.title,
            start: e.start_time,
            end: e.end_time,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventList {
    pub events: Vec<EventItem>,
}

#[derive(Debug, Serialize)]
pub struct EventMutation {
    pub success: bool,
    pub event: EventItem,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}

#[derive(Debug, Deserialize)]
pub struct EventRequest {
    pub title: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Accepts RFC 3339, or a naive `YYYY-MM-DDTHH:MM:SS` taken as UTC.
pub(crate) fn parse_event_time(raw: &str, field: &str) -> Result<OffsetDateTime, ApiError> {
    let raw = raw.trim();
    if let Ok(t) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(t);
    }
    PrimitiveDateTime::parse(
        raw,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    )
    .map(PrimitiveDateTime::assume_utc)
    .map_err(|_| ApiError::validation(format!("Invalid {field} time")))
}

impl TryFrom<EventRequest> for EventFields {
    type Error = ApiError;

    fn try_from(req: EventRequest) -> Result<Self, Self::Error> {
        let title = req
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::validation("Missing title"))?;
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(ApiError::validation("Title too long"));
        }

        let start = req.start.ok_or_else(|| ApiError::validation("Missing start"))?;
        let end = req.end.ok_or_else(|| ApiError::validation("Missing end"))?;
        let start_time = parse_event_time(&start, "start")?;
        let end_time = parse_event_time(&end, "end")?;
        if end_time < start_time {
            return Err(ApiError::validation("Event ends before it starts"));
        }

        Ok(EventFields {
            title,
            start_time,
            end_time,
        })
    }
}
