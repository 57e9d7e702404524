//! Typed wrappers over the recognition service's HTTP endpoints.

use crate::camera::CameraStream;
use crate::error::Result;
use crate::plate::PlateNumber;
use crate::session::Session;
use crate::types::{
    timestamp, DetectionEvent, LogEntry, NewLogEntry, NewVehicle, PlateStatus, VehicleInfo,
    VehicleRecord,
};
use chrono::Utc;
use log::{debug, info};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use std::collections::HashMap;
use url::Url;

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base: Url,
}

#[derive(Debug, Deserialize)]
struct LoginReply {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
}

/// What `detect` answers. Depending on the service version this is either a
/// full detection event or only a status label with the matched vehicle.
#[derive(Debug, Deserialize)]
struct DetectReply {
    #[serde(default)]
    plate_number: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    vehicle: Option<VehicleInfo>,
}

impl DetectReply {
    fn into_event(self, requested: &PlateNumber) -> DetectionEvent {
        let status = self
            .status
            .as_deref()
            .map(PlateStatus::lenient)
            .unwrap_or_default();
        DetectionEvent {
            plate_number: self.plate_number.unwrap_or_else(|| requested.to_string()),
            status,
            timestamp: self
                .timestamp
                .as_deref()
                .and_then(timestamp::parse)
                .unwrap_or_else(Utc::now),
            vehicle: self.vehicle,
        }
    }
}

impl ApiClient {
    /// `base` must end with a slash; endpoint paths are joined onto it.
    pub fn new(base: Url) -> Self {
        ApiClient {
            http: Client::new(),
            base,
        }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path)?)
    }

    fn request(&self, method: Method, path: &str, session: &Session) -> Result<RequestBuilder> {
        let url = self.endpoint(path)?;
        debug!("{} {}", method, url);
        Ok(self.http.request(method, url).bearer_auth(session.token()?))
    }

    async fn send(builder: RequestBuilder) -> Result<Response> {
        Ok(builder.send().await?.error_for_status()?)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Session> {
        let mut form = HashMap::new();
        form.insert("username", username);
        form.insert("password", password);
        let login = self.http.post(self.endpoint("auth/login")?).form(&form);
        let reply: LoginReply = Self::send(login).await?.json().await?;
        debug!("Login token type {:?}", reply.token_type);
        info!("Logged in as {}", username);
        Ok(Session::from_token(reply.access_token))
    }

    /// Runs a manual plate check. The service records it in the log and
    /// pushes it to live feeds as well.
    pub async fn check_plate(
        &self,
        session: &Session,
        plate: &PlateNumber,
    ) -> Result<DetectionEvent> {
        let mut body = HashMap::new();
        body.insert("plate_number", plate.as_str());
        let reply: DetectReply =
            Self::send(self.request(Method::POST, "detect", session)?.json(&body))
                .await?
                .json()
                .await?;
        Ok(reply.into_event(plate))
    }

    pub async fn list_logs(&self, session: &Session) -> Result<Vec<LogEntry>> {
        Ok(Self::send(self.request(Method::GET, "logs", session)?)
            .await?
            .json()
            .await?)
    }

    pub async fn create_log(&self, session: &Session, entry: &NewLogEntry) -> Result<LogEntry> {
        Ok(
            Self::send(self.request(Method::POST, "logs", session)?.json(entry))
                .await?
                .json()
                .await?,
        )
    }

    pub async fn clear_logs(&self, session: &Session) -> Result<()> {
        Self::send(self.request(Method::DELETE, "logs/clear", session)?).await?;
        info!("Cleared detection log");
        Ok(())
    }

    pub async fn list_vehicles(&self, session: &Session) -> Result<Vec<VehicleRecord>> {
        Ok(Self::send(self.request(Method::GET, "vehicles", session)?)
            .await?
            .json()
            .await?)
    }

    pub async fn get_vehicle(
        &self,
        session: &Session,
        plate: &PlateNumber,
    ) -> Result<VehicleRecord> {
        let path = format!("vehicles/{}", plate);
        Ok(Self::send(self.request(Method::GET, &path, session)?)
            .await?
            .json()
            .await?)
    }

    pub async fn create_vehicle(
        &self,
        session: &Session,
        vehicle: &NewVehicle,
    ) -> Result<VehicleRecord> {
        let record: VehicleRecord =
            Self::send(self.request(Method::POST, "vehicles", session)?.json(vehicle))
                .await?
                .json()
                .await?;
        info!("Registered vehicle {} ({})", record.plate_number, record.name);
        Ok(record)
    }

    pub async fn update_vehicle(
        &self,
        session: &Session,
        plate: &PlateNumber,
        vehicle: &NewVehicle,
    ) -> Result<VehicleRecord> {
        let path = format!("vehicles/{}", plate);
        Ok(
            Self::send(self.request(Method::PUT, &path, session)?.json(vehicle))
                .await?
                .json()
                .await?,
        )
    }

    pub async fn delete_vehicle(&self, session: &Session, plate: &PlateNumber) -> Result<()> {
        let path = format!("vehicles/{}", plate);
        Self::send(self.request(Method::DELETE, &path, session)?).await?;
        info!("Removed vehicle {}", plate);
        Ok(())
    }

    /// Opening the video feed switches the camera on.
    pub async fn video_feed(&self, session: &Session) -> Result<CameraStream> {
        let response = Self::send(self.request(Method::GET, "video_feed", session)?).await?;
        Ok(CameraStream::new(response))
    }

    pub async fn stop_camera(&self, session: &Session) -> Result<()> {
        Self::send(self.request(Method::POST, "stop_camera", session)?).await?;
        info!("Camera stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ApiClient {
        ApiClient::new(Url::parse("http://127.0.0.1:8000/api/").unwrap())
    }

    #[test]
    fn endpoints_are_joined_under_the_base() {
        let client = client();
        assert_eq!(
            client.endpoint("logs/clear").unwrap().as_str(),
            "http://127.0.0.1:8000/api/logs/clear"
        );
        let plate = PlateNumber::parse("abc 1234").unwrap();
        assert_eq!(
            client
                .endpoint(&format!("vehicles/{}", plate))
                .unwrap()
                .as_str(),
            "http://127.0.0.1:8000/api/vehicles/ABC1234"
        );
    }

    #[test]
    fn authorized_requests_need_a_session() {
        assert!(client()
            .request(Method::GET, "logs", &Session::anonymous())
            .is_err());
        assert!(client()
            .request(Method::GET, "logs", &Session::from_token("t"))
            .is_ok());
    }

    #[test]
    fn detect_reply_with_full_event() {
        let reply: DetectReply = serde_json::from_str(
            r#"{"plate_number":"ABC1234","status":"registered","timestamp":"2024-01-01T00:00:00Z",
                "vehicle":{"name":"Jane"}}"#,
        )
        .unwrap();
        let plate = PlateNumber::parse("ABC1234").unwrap();
        let event = reply.into_event(&plate);
        assert_eq!(event.status, PlateStatus::Registered);
        assert_eq!(event.timestamp.to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert_eq!(event.vehicle.unwrap().name, "Jane");
    }

    #[test]
    fn detect_reply_with_label_only() {
        let reply: DetectReply = serde_json::from_str(r#"{"status":"🚫 Unregistered"}"#).unwrap();
        let plate = PlateNumber::parse("xyz-987").unwrap();
        let before = Utc::now();
        let event = reply.into_event(&plate);
        assert_eq!(event.plate_number, "XYZ987");
        assert_eq!(event.status, PlateStatus::Unregistered);
        assert!(event.timestamp >= before);
        assert!(event.vehicle.is_none());
    }
}
