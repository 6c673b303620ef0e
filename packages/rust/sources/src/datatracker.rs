//! IETF Datatracker API client.
//!
//! Uses the Tastypie endpoints under `/api/v1/`. Related objects come back
//! as resource URIs (`/api/v1/group/group/2345/`) and are fetched one by one.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;

use ietf2vcon_shared::{Fetch, Ietf2VconError, Material, Meeting, Person, Result, Session};

use crate::{MaterialsFetcher, ResolvedSession, SessionResolver, http_client};

/// Page size requested from list endpoints.
const PAGE_LIMIT: &str = "100";

/// Collaborative notes site.
const NOTES_BASE: &str = "https://notes.ietf.org";

// ---------------------------------------------------------------------------
// Wire records
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default)]
    meta: PageMeta,
    #[serde(default = "Vec::new")]
    objects: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
struct PageMeta {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MeetingRecord {
    city: Option<String>,
    country: Option<String>,
    date: Option<String>,
    time_zone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionRecord {
    id: Option<u64>,
    group: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GroupRecord {
    acronym: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssignmentRecord {
    timeslot: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TimeslotRecord {
    time: Option<String>,
    duration: Option<String>,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedRecord {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PresentationRecord {
    document: Option<String>,
    order: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct DocumentRecord {
    #[serde(default)]
    name: String,
    title: Option<String>,
    external_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoleRecord {
    person: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmailRecord {
    address: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Datatracker client.
#[derive(Debug, Clone)]
pub struct DatatrackerClient {
    client: reqwest::Client,
    base: Url,
}

impl DatatrackerClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| Ietf2VconError::config(format!("invalid datatracker URL: {e}")))?;
        Ok(Self {
            client: http_client(timeout)?,
            base,
        })
    }

    fn site_url(&self, path: &str) -> String {
        format!("{}{}", self.base.as_str().trim_end_matches('/'), path)
    }

    async fn get_json<T: DeserializeOwned>(&self, uri: &str, query: &[(&str, String)]) -> Result<T> {
        let url = self
            .base
            .join(uri)
            .map_err(|e| Ietf2VconError::parse(format!("bad resource URI {uri}: {e}")))?;

        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .query(query)
            .send()
            .await
            .map_err(|e| Ietf2VconError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Ietf2VconError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| Ietf2VconError::parse(format!("{url}: {e}")))
    }

    /// Collect every object of a list endpoint, following `meta.next`.
    async fn get_paginated<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let mut query: Vec<(&str, String)> = query.to_vec();
        query.push(("limit", PAGE_LIMIT.to_string()));

        let mut objects = Vec::new();
        let mut page: Page<T> = self.get_json(path, &query).await?;
        loop {
            objects.append(&mut page.objects);
            match page.meta.next.take() {
                // The next URI already carries the query string.
                Some(next) if !next.is_empty() => page = self.get_json(&next, &[]).await?,
                _ => break,
            }
        }
        Ok(objects)
    }

    /// Meeting metadata, or `None` if the number is unknown.
    #[instrument(skip(self))]
    pub async fn meeting(&self, number: u32) -> Result<Option<Meeting>> {
        let page: Page<MeetingRecord> = self
            .get_json("/api/v1/meeting/meeting/", &[("number", number.to_string())])
            .await?;

        Ok(page.objects.into_iter().next().map(|m| Meeting {
            number,
            city: m.city.filter(|s| !s.is_empty()),
            country: m.country.filter(|s| !s.is_empty()),
            start_date: m.date.as_deref().and_then(parse_datetime),
            time_zone: m.time_zone.filter(|s| !s.is_empty()),
        }))
    }

    /// Every session of `group` at `meeting`, with schedule details.
    #[instrument(skip(self))]
    pub async fn group_sessions(&self, meeting: u32, group: &str) -> Result<Vec<Session>> {
        let records: Vec<SessionRecord> = self
            .get_paginated(
                "/api/v1/meeting/session/",
                &[
                    ("meeting__number", meeting.to_string()),
                    ("group__acronym", group.to_string()),
                ],
            )
            .await?;

        let mut sessions = Vec::with_capacity(records.len());
        for record in records {
            let group_name = match record.group.as_deref() {
                Some(uri) => self
                    .get_json::<GroupRecord>(uri, &[])
                    .await
                    .ok()
                    .and_then(|g| g.name),
                None => None,
            };

            let mut session = Session::minimal(meeting, group);
            if let Some(id) = record.id {
                session.session_id = id.to_string();
                if let Err(e) = self.fill_schedule(&mut session, id, meeting).await {
                    debug!(session_id = id, error = %e, "no schedule for session");
                }
            }
            session.name = group_name.or(record.name).filter(|s| !s.is_empty());
            sessions.push(session);
        }
        Ok(sessions)
    }

    /// Start time, duration, and room from the session's timeslot.
    async fn fill_schedule(&self, session: &mut Session, id: u64, meeting: u32) -> Result<()> {
        let assignments: Page<AssignmentRecord> = self
            .get_json(
                "/api/v1/meeting/schedtimesessassignment/",
                &[
                    ("session", id.to_string()),
                    ("schedule__meeting__number", meeting.to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;

        let Some(timeslot_uri) = assignments.objects.into_iter().find_map(|a| a.timeslot) else {
            return Ok(());
        };
        let timeslot: TimeslotRecord = self.get_json(&timeslot_uri, &[]).await?;

        session.start_time = timeslot.time.as_deref().and_then(parse_datetime);
        session.duration_seconds = timeslot.duration.as_deref().and_then(parse_duration);
        if let Some(location) = timeslot.location.as_deref() {
            session.room = self
                .get_json::<NamedRecord>(location, &[])
                .await
                .ok()
                .and_then(|l| l.name);
        }
        Ok(())
    }

    /// Every session at `meeting`, without schedule details. Used for listings.
    #[instrument(skip(self))]
    pub async fn meeting_sessions(&self, meeting: u32) -> Result<Vec<Session>> {
        let records: Vec<SessionRecord> = self
            .get_paginated(
                "/api/v1/meeting/session/",
                &[("meeting__number", meeting.to_string())],
            )
            .await?;

        let mut groups: HashMap<String, GroupRecord> = HashMap::new();
        let mut sessions = Vec::with_capacity(records.len());
        for record in records {
            let (acronym, name) = match record.group.as_deref() {
                Some(uri) => {
                    if !groups.contains_key(uri) {
                        match self.get_json::<GroupRecord>(uri, &[]).await {
                            Ok(g) => {
                                groups.insert(uri.to_string(), g);
                            }
                            Err(e) => debug!(uri, error = %e, "group lookup failed"),
                        }
                    }
                    let g = groups.get(uri);
                    (
                        g.and_then(|g| g.acronym.clone()),
                        g.and_then(|g| g.name.clone()),
                    )
                }
                None => (None, None),
            };

            let acronym = acronym.unwrap_or_else(|| "unknown".to_string());
            let mut session = Session::minimal(meeting, &acronym);
            if let Some(id) = record.id {
                session.session_id = id.to_string();
            }
            session.name = name.or(record.name).filter(|s| !s.is_empty());
            sessions.push(session);
        }
        Ok(sessions)
    }

    /// Materials presented in `group`'s sessions, plus the agenda page and
    /// collaborative notes.
    #[instrument(skip(self))]
    pub async fn materials(&self, meeting: u32, group: &str) -> Result<Vec<Material>> {
        let presentations: Vec<PresentationRecord> = self
            .get_paginated(
                "/api/v1/meeting/sessionpresentation/",
                &[
                    ("session__meeting__number", meeting.to_string()),
                    ("session__group__acronym", group.to_string()),
                ],
            )
            .await?;

        let mut materials = Vec::with_capacity(presentations.len() + 2);
        for item in presentations {
            let Some(doc_uri) = item.document else {
                continue;
            };
            let doc: DocumentRecord = match self.get_json(&doc_uri, &[]).await {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(uri = %doc_uri, error = %e, "skipping unreadable document");
                    continue;
                }
            };
            if doc.name.is_empty() {
                continue;
            }

            let (kind, mimetype) = classify_document(&doc.name);
            let url = doc
                .external_url
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| self.site_url(&format!("/meeting/{meeting}/materials/{}", doc.name)));
            let filename = if mimetype == "application/pdf" {
                format!("{}.pdf", doc.name)
            } else {
                doc.name.clone()
            };

            materials.push(Material {
                kind: kind.to_string(),
                title: doc.title.filter(|t| !t.is_empty()).unwrap_or_else(|| doc.name.clone()),
                url,
                filename: Some(filename),
                mimetype: Some(mimetype.to_string()),
                order: item.order,
            });
        }

        let upper = group.to_uppercase();
        materials.push(Material {
            kind: "agenda".into(),
            title: format!("{upper} Agenda"),
            url: self.site_url(&format!("/meeting/{meeting}/agenda/{group}/")),
            filename: None,
            mimetype: Some("text/html".into()),
            order: None,
        });
        materials.push(Material {
            kind: "minutes".into(),
            title: format!("{upper} Notes"),
            url: format!("{NOTES_BASE}/notes-ietf-{meeting}-{group}"),
            filename: None,
            mimetype: Some("text/markdown".into()),
            order: None,
        });

        Ok(materials)
    }

    /// Body of a material document. External URLs are followed as-is.
    #[instrument(skip(self, material), fields(url = %material.url))]
    pub async fn material_content(&self, material: &Material) -> Result<Vec<u8>> {
        let url = Url::parse(&material.url)
            .map_err(|e| Ietf2VconError::parse(format!("bad material URL {}: {e}", material.url)))?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Ietf2VconError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Ietf2VconError::Network(format!("{url}: HTTP {status}")));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Ietf2VconError::Network(format!("{url}: {e}")))?;
        debug!(bytes = bytes.len(), "downloaded material");
        Ok(bytes.to_vec())
    }

    /// Current chairs of `group`, deduplicated by name.
    #[instrument(skip(self))]
    pub async fn group_chairs(&self, group: &str) -> Result<Vec<Person>> {
        let page: Page<RoleRecord> = self
            .get_json(
                "/api/v1/group/role/",
                &[
                    ("group__acronym", group.to_string()),
                    ("name__slug", "chair".to_string()),
                    ("limit", "10".to_string()),
                ],
            )
            .await?;

        let mut chairs: Vec<Person> = Vec::new();
        for role in page.objects {
            let Some(person_uri) = role.person else {
                continue;
            };
            let name = match self.get_json::<NamedRecord>(&person_uri, &[]).await {
                Ok(NamedRecord { name: Some(name) }) if !name.is_empty() => name,
                Ok(_) => continue,
                Err(e) => {
                    debug!(uri = %person_uri, error = %e, "person lookup failed");
                    continue;
                }
            };
            if chairs.iter().any(|c| c.name == name) {
                continue;
            }
            let email = match role.email.as_deref() {
                Some(uri) => self
                    .get_json::<EmailRecord>(uri, &[])
                    .await
                    .ok()
                    .and_then(|e| e.address),
                None => None,
            };
            chairs.push(Person {
                name,
                email,
                affiliation: None,
                role: Some("chair".into()),
            });
        }
        Ok(chairs)
    }
}

#[async_trait]
impl SessionResolver for DatatrackerClient {
    async fn resolve(&self, meeting: u32, group: &str, index: usize) -> Fetch<ResolvedSession> {
        let mut notes = Vec::new();

        let meeting_record = match self.meeting(meeting).await {
            Ok(Some(m)) => Some(m),
            Ok(None) => {
                notes.push(format!("meeting {meeting} not found in Datatracker"));
                None
            }
            Err(e) => {
                notes.push(format!("could not fetch meeting {meeting}: {e}"));
                None
            }
        };

        let sessions = match self.group_sessions(meeting, group).await {
            Ok(sessions) => sessions,
            Err(e) => {
                notes.push(format!("could not fetch sessions for {group}: {e}"));
                Vec::new()
            }
        };

        if meeting_record.is_none() && sessions.is_empty() {
            return Fetch::Unavailable(notes.join("; "));
        }

        let session = if sessions.is_empty() {
            notes.push(format!("no {group} session found at IETF {meeting}"));
            Session::minimal(meeting, group)
        } else if index < sessions.len() {
            sessions[index].clone()
        } else {
            notes.push(format!(
                "session index {index} not found ({} sessions), using the first",
                sessions.len()
            ));
            sessions[0].clone()
        };

        Fetch::Available(ResolvedSession {
            meeting: meeting_record.unwrap_or_else(|| Meeting::numbered(meeting)),
            session,
            notes,
        })
    }

    async fn chairs(&self, group: &str) -> Fetch<Vec<Person>> {
        Fetch::from_result(self.group_chairs(group).await)
            .non_empty(format!("no chairs listed for {group}"))
    }
}

#[async_trait]
impl MaterialsFetcher for DatatrackerClient {
    async fn fetch_materials(&self, meeting: u32, group: &str) -> Fetch<Vec<Material>> {
        Fetch::from_result(self.materials(meeting, group).await)
            .non_empty(format!("no materials for {group} at IETF {meeting}"))
    }

    async fn material_content(&self, material: &Material) -> Fetch<Vec<u8>> {
        Fetch::from_result(self.material_content(material).await)
            .non_empty(format!("{} is empty", material.url))
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Material type and mimetype from a Datatracker document name.
pub fn classify_document(name: &str) -> (&'static str, &'static str) {
    const RULES: &[(&str, &str, &str)] = &[
        ("slides", "slides", "application/pdf"),
        ("agenda", "agenda", "application/pdf"),
        ("minutes", "minutes", "application/pdf"),
        ("recording", "recording", "text/html"),
        ("chatlog", "chatlog", "text/plain"),
        ("bluesheets", "bluesheets", "application/pdf"),
    ];
    RULES
        .iter()
        .find(|(needle, _, _)| name.contains(needle))
        .map(|(_, kind, mime)| (*kind, *mime))
        .unwrap_or(("document", "application/pdf"))
}

/// `HH:MM:SS` or `MM:SS` to seconds.
pub fn parse_duration(s: &str) -> Option<u64> {
    let parts: Vec<u64> = s
        .trim()
        .split(':')
        .map(|p| p.parse().ok())
        .collect::<Option<_>>()?;
    match parts.as_slice() {
        [h, m, s] => Some(h * 3600 + m * 60 + s),
        [m, s] => Some(m * 60 + s),
        _ => None,
    }
}

/// RFC 3339, naive `YYYY-MM-DDTHH:MM:SS` (taken as UTC), or a bare date.
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
