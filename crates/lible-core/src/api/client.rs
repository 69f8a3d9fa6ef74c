//! API client for the bell-schedule backend.
//!
//! This module provides the `ApiClient` struct for managing timetables,
//! their events, event templates, sounds and holidays. Requests normally go
//! through the session's `RequestAuthorizer`, so the client itself never
//! handles tokens.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::models::validation::Validator;
use crate::models::{
    EventTemplate, EventTemplateDraft, Holiday, HolidayDraft, Sound, SoundUpload, Timetable,
    TimetableDraft, TimetableEvent, TimetableEventDraft,
};

use super::transport::{FilePart, MultipartForm};
use super::{ApiError, ApiRequest, ApiResponse, Transport};

// ============================================================================
// Constants
// ============================================================================

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Multipart field names expected by `POST /sounds`
const SOUND_NAME_FIELD: &str = "name";
const SOUND_FILE_FIELD: &str = "sound_file";

/// Typed client for the resource endpoints.
/// Clone is cheap; clones share the underlying transport.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Send a request, backing off while the backend answers 429.
    /// Any other non-2xx status becomes an `ApiError`.
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self.transport.send(request.clone()).await?;
            if response.status != StatusCode::TOO_MANY_REQUESTS {
                return response.into_result();
            }

            retries += 1;
            if retries > MAX_RATE_LIMIT_RETRIES {
                return Err(ApiError::RateLimited);
            }
            warn!(path = %request.path, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            backoff_ms *= 2; // Exponential backoff
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute(ApiRequest::get(path)).await?.json()
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.execute(ApiRequest::post(path).json(body)?).await?.json()
    }

    async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.execute(ApiRequest::put(path).json(body)?).await?.json()
    }

    async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.execute(ApiRequest::delete(path)).await?;
        Ok(())
    }

    // ===== Timetables =====

    pub async fn list_timetables(&self) -> Result<Vec<Timetable>, ApiError> {
        self.get("/timetables").await
    }

    pub async fn get_timetable(&self, id: i64) -> Result<Timetable, ApiError> {
        self.get(&format!("/timetables/{}", id)).await
    }

    pub async fn create_timetable(&self, draft: &TimetableDraft) -> Result<Timetable, ApiError> {
        draft.validate()?;
        self.post("/timetables", draft).await
    }

    pub async fn update_timetable(
        &self,
        id: i64,
        draft: &TimetableDraft,
    ) -> Result<Timetable, ApiError> {
        draft.validate()?;
        self.put(&format!("/timetables/{}", id), draft).await
    }

    pub async fn delete_timetable(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&format!("/timetables/{}", id)).await
    }

    // ===== Timetable events =====

    pub async fn list_events(&self, timetable_id: i64) -> Result<Vec<TimetableEvent>, ApiError> {
        self.get(&format!("/timetables/{}/events", timetable_id)).await
    }

    pub async fn create_event(
        &self,
        timetable_id: i64,
        draft: &TimetableEventDraft,
    ) -> Result<TimetableEvent, ApiError> {
        draft.validate()?;
        self.post(&format!("/timetables/{}/events", timetable_id), draft)
            .await
    }

    pub async fn update_event(
        &self,
        timetable_id: i64,
        event_id: i64,
        draft: &TimetableEventDraft,
    ) -> Result<TimetableEvent, ApiError> {
        draft.validate()?;
        self.put(
            &format!("/timetables/{}/events/{}", timetable_id, event_id),
            draft,
        )
        .await
    }

    pub async fn delete_event(&self, timetable_id: i64, event_id: i64) -> Result<(), ApiError> {
        self.delete(&format!("/timetables/{}/events/{}", timetable_id, event_id))
            .await
    }

    /// Place `template` into a timetable with its base event at `base`.
    ///
    /// Events are created one by one in time order. On failure the events
    /// created so far are left in place.
    pub async fn apply_template(
        &self,
        timetable_id: i64,
        template: &EventTemplate,
        base: NaiveTime,
    ) -> Result<Vec<TimetableEvent>, ApiError> {
        let drafts = template.expand(base);
        debug!(template_id = template.id, timetable_id, count = drafts.len(), "Applying template");

        let mut created = Vec::with_capacity(drafts.len());
        for draft in &drafts {
            created.push(self.create_event(timetable_id, draft).await?);
        }
        Ok(created)
    }

    // ===== Templates =====

    pub async fn list_templates(&self) -> Result<Vec<EventTemplate>, ApiError> {
        self.get("/templates").await
    }

    pub async fn get_template(&self, id: i64) -> Result<EventTemplate, ApiError> {
        self.get(&format!("/templates/{}", id)).await
    }

    pub async fn create_template(
        &self,
        draft: &EventTemplateDraft,
    ) -> Result<EventTemplate, ApiError> {
        draft.validate()?;
        self.post("/templates", draft).await
    }

    pub async fn update_template(
        &self,
        id: i64,
        draft: &EventTemplateDraft,
    ) -> Result<EventTemplate, ApiError> {
        draft.validate()?;
        self.put(&format!("/templates/{}", id), draft).await
    }

    pub async fn delete_template(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&format!("/templates/{}", id)).await
    }

    // ===== Sounds =====

    pub async fn list_sounds(&self) -> Result<Vec<Sound>, ApiError> {
        self.get("/sounds").await
    }

    pub async fn upload_sound(&self, upload: &SoundUpload) -> Result<Sound, ApiError> {
        upload.validate()?;
        let form = MultipartForm {
            fields: vec![(SOUND_NAME_FIELD.to_string(), upload.name.trim().to_string())],
            files: vec![FilePart {
                field: SOUND_FILE_FIELD.to_string(),
                file_name: upload.file_name.clone(),
                mime: upload.mime.clone(),
                bytes: upload.bytes.clone(),
            }],
        };
        debug!(size = upload.bytes.len(), mime = %upload.mime, "Uploading sound");
        self.execute(ApiRequest::post("/sounds").multipart(form))
            .await?
            .json()
    }

    /// Raw audio file of a sound, as uploaded.
    pub async fn download_sound(&self, id: i64) -> Result<Vec<u8>, ApiError> {
        let response = self.execute(ApiRequest::get(format!("/sounds/{}", id))).await?;
        debug!(id, size = response.body.len(), "Downloaded sound");
        Ok(response.body)
    }

    pub async fn rename_sound(&self, id: i64, name: &str) -> Result<Sound, ApiError> {
        let mut v = Validator::new();
        v.name("name", name);
        v.finish()?;
        self.put(&format!("/sounds/{}", id), &json!({ "name": name.trim() }))
            .await
    }

    pub async fn delete_sound(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&format!("/sounds/{}", id)).await
    }

    // ===== Holidays =====

    pub async fn list_holidays(&self) -> Result<Vec<Holiday>, ApiError> {
        self.get("/holidays").await
    }

    pub async fn create_holiday(&self, draft: &HolidayDraft) -> Result<Holiday, ApiError> {
        draft.validate()?;
        self.post("/holidays", draft).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RequestBody;
    use crate::models::{EventTemplateItem, Weekdays};
    use crate::test_support::{json_response, StubTransport};
    use chrono::NaiveDate;
    use reqwest::Method;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn client(stub: &Arc<StubTransport>) -> ApiClient {
        ApiClient::new(stub.clone())
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[tokio::test]
    async fn test_list_timetables() {
        let stub = StubTransport::new(|req| {
            assert_eq!(req.method, Method::GET);
            assert_eq!(req.path, "/timetables");
            Ok(json_response(
                200,
                r#"[{"id":1,"name":"Põhikool","valid_from":"2024-09-01","valid_until":"2025-06-15","weekdays":31}]"#,
            ))
        });
        let timetables = client(&stub).list_timetables().await.unwrap();
        assert_eq!(timetables.len(), 1);
        assert_eq!(timetables[0].weekdays, Weekdays::WORKDAYS);
        assert!(timetables[0].events.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_draft_is_not_sent() {
        let stub = StubTransport::new(|_| panic!("no request expected"));
        let draft = TimetableDraft {
            name: "Sügis".into(),
            valid_from: date("2024-09-01"),
            valid_until: None,
            weekdays: Weekdays::NONE,
        };
        let err = client(&stub).create_timetable(&draft).await.unwrap_err();
        match err {
            ApiError::Validation(v) => assert!(v.has("weekdays")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_event_path_and_body() {
        let stub = StubTransport::new(|req| {
            assert_eq!(req.method, Method::PUT);
            assert_eq!(req.path, "/timetables/3/events/12");
            match &req.body {
                RequestBody::Json(v) => assert_eq!(v["event_time"], "08:15"),
                other => panic!("unexpected body {other:?}"),
            }
            Ok(json_response(
                200,
                r#"{"id":12,"timetable_id":3,"event_name":"1. tund","event_time":"08:15","sound_id":1}"#,
            ))
        });
        let draft = TimetableEventDraft::new("1. tund", NaiveTime::from_hms_opt(8, 15, 0).unwrap(), 1);
        let event = client(&stub).update_event(3, 12, &draft).await.unwrap();
        assert_eq!(event.id, 12);
        assert!(!event.is_template_base);
    }

    #[tokio::test]
    async fn test_apply_template_creates_each_event() {
        let stub = StubTransport::new(|req| {
            let RequestBody::Json(ref body) = req.body else {
                panic!("expected json body");
            };
            Ok(json_response(
                201,
                &json!({
                    "id": 1,
                    "timetable_id": 5,
                    "event_name": body["event_name"],
                    "event_time": body["event_time"],
                    "sound_id": body["sound_id"],
                    "template_instance_id": body["template_instance_id"],
                    "is_template_base": body["is_template_base"],
                })
                .to_string(),
            ))
        });
        let template = EventTemplate {
            id: 9,
            name: "Tund".into(),
            description: None,
            items: vec![
                EventTemplateItem { id: 1, template_id: 9, offset_minutes: 0, event_name: "Algus".into(), sound_id: 1 },
                EventTemplateItem { id: 2, template_id: 9, offset_minutes: 45, event_name: "Lõpp".into(), sound_id: 2 },
            ],
        };

        let events = client(&stub)
            .apply_template(5, &template, NaiveTime::from_hms_opt(8, 0, 0).unwrap())
            .await
            .unwrap();
        assert_eq!(stub.count("/timetables/5/events"), 2);
        assert_eq!(events[1].event_time, "08:45");
        assert!(events[0].is_template_base);
        assert_eq!(events[1].template_instance_id, Some(9));
    }

    #[tokio::test]
    async fn test_upload_sound_is_multipart() {
        let stub = StubTransport::new(|req| {
            match &req.body {
                RequestBody::Multipart(form) => {
                    assert_eq!(form.fields, vec![("name".to_string(), "Kell".to_string())]);
                    assert_eq!(form.files[0].field, "sound_file");
                    assert_eq!(form.files[0].mime, "audio/mpeg");
                }
                other => panic!("unexpected body {other:?}"),
            }
            Ok(json_response(201, r#"{"id":4,"name":"Kell","filename":"kell.mp3"}"#))
        });
        let upload = SoundUpload {
            name: " Kell ".into(),
            file_name: "kell.mp3".into(),
            mime: "audio/mpeg".into(),
            bytes: vec![1, 2, 3],
        };
        let sound = client(&stub).upload_sound(&upload).await.unwrap();
        assert_eq!(sound.id, 4);
    }

    #[tokio::test]
    async fn test_download_sound_returns_raw_bytes() {
        let audio: Vec<u8> = vec![0x49, 0x44, 0x33, 0x04, 0x00, 0xff, 0xfb, 0x90];
        let served = audio.clone();
        let stub = StubTransport::new(move |req| {
            assert_eq!(req.method, Method::GET);
            assert_eq!(req.path, "/sounds/4");
            Ok(ApiResponse::new(StatusCode::OK, served.clone()))
        });
        let bytes = client(&stub).download_sound(4).await.unwrap();
        assert_eq!(bytes, audio);

        let stub = StubTransport::new(|_| Ok(json_response(404, r#"{"detail":"Heli ei leitud"}"#)));
        assert!(matches!(
            client(&stub).download_sound(7).await,
            Err(ApiError::NotFound(ref m)) if m == "Heli ei leitud"
        ));
    }

    #[tokio::test]
    async fn test_delete_ignores_empty_body() {
        let stub = StubTransport::new(|req| {
            assert_eq!(req.method, Method::DELETE);
            Ok(json_response(204, ""))
        });
        client(&stub).delete_sound(4).await.unwrap();
        assert_eq!(stub.count("/sounds/4"), 1);
    }

    #[tokio::test]
    async fn test_error_statuses_map_to_api_errors() {
        let stub = StubTransport::new(|_| Ok(json_response(404, r#"{"detail":"Tunniplaan ei leitud"}"#)));
        assert!(matches!(
            client(&stub).get_timetable(99).await,
            Err(ApiError::NotFound(ref m)) if m == "Tunniplaan ei leitud"
        ));

        let stub = StubTransport::new(|_| Ok(json_response(401, "")));
        assert!(matches!(
            client(&stub).list_holidays().await,
            Err(ApiError::Unauthorized)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_backs_off_then_succeeds() {
        let attempts = AtomicUsize::new(0);
        let stub = StubTransport::new(move |_| {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Ok(json_response(429, ""))
            } else {
                Ok(json_response(200, "[]"))
            }
        });

        let started = tokio::time::Instant::now();
        let sounds = client(&stub).list_sounds().await.unwrap();
        assert!(sounds.is_empty());
        assert_eq!(stub.count("/sounds"), 3);
        // 1s + 2s of backoff
        assert!(started.elapsed() >= Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_gives_up() {
        let stub = StubTransport::new(|_| Ok(json_response(429, "")));
        let err = client(&stub).list_templates().await.unwrap_err();
        assert!(matches!(err, ApiError::RateLimited));
        assert_eq!(stub.count("/templates"), (MAX_RATE_LIMIT_RETRIES + 1) as usize);
    }
}
