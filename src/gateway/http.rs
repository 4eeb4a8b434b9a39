//! REST implementation of [`HabitsGateway`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Ack, CreateHabitResponse, GatewayResult, HabitsGateway, StartMonth, ToggleResponse};
use crate::config::ServerConfig;
use crate::date_window::YearMonth;
use crate::error::{Error, RemoteError, Result};
use crate::habit::{HabitId, HabitRecord};
use crate::session::AuthSession;

/// HTTP client for the habits API.
///
/// Every request carries the bearer token currently held by the injected
/// [`AuthSession`]; a 401 surfaces as [`RemoteError::Unauthorized`].
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
    session: AuthSession,
}

#[derive(Serialize)]
struct NameBody<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct ToggleBody {
    day: u32,
    month: u32,
    year: i32,
}

/// Error bodies look like `{ "message": "..." }` when the backend produced them.
#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl HttpGateway {
    /// Create a gateway from the `[server]` config section.
    pub fn new(config: &ServerConfig, session: AuthSession) -> Result<Self> {
        Self::with_timeout(&config.base_url, config.timeout(), session)
    }

    /// Create a gateway with an explicit request timeout.
    pub fn with_timeout(base_url: &str, timeout: Duration, session: AuthSession) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    /// The session whose token is attached to requests.
    #[must_use]
    pub const fn session(&self) -> &AuthSession {
        &self.session
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        debug!(%method, path, "Sending request");
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match self.session.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub(crate) async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> GatewayResult<T> {
        let response = request.send().await?;
        handle_response(response).await
    }
}

async fn handle_response<T: DeserializeOwned>(response: Response) -> GatewayResult<T> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(RemoteError::Unauthorized);
    }

    // Reading the body can still time out or lose the connection.
    let body = response.bytes().await?;

    if !status.is_success() {
        let message = serde_json::from_slice::<ErrorBody>(&body).map_or_else(
            |_| String::from_utf8_lossy(&body).into_owned(),
            |err| err.message,
        );
        return Err(RemoteError::Status {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_slice(&body).map_err(|e| RemoteError::InvalidResponse(e.to_string()))
}

fn habit_path(habit_id: &HabitId) -> String {
    format!("/habits/{}", urlencoding::encode(habit_id.as_str()))
}

#[async_trait]
impl HabitsGateway for HttpGateway {
    async fn start_month(&self) -> GatewayResult<Option<YearMonth>> {
        let start: StartMonth = self.send(self.request(Method::GET, "/habits/start")).await?;
        Ok(start.to_year_month())
    }

    async fn list_habits(&self, month: YearMonth) -> GatewayResult<Vec<HabitRecord>> {
        let path = format!("/habits?month={}&year={}", month.month, month.year);
        self.send(self.request(Method::GET, &path)).await
    }

    async fn create_habit(&self, name: &str) -> GatewayResult<CreateHabitResponse> {
        let request = self.request(Method::POST, "/habits").json(&NameBody { name });
        self.send(request).await
    }

    async fn toggle_day(
        &self,
        habit_id: &HabitId,
        day: u32,
        month: YearMonth,
    ) -> GatewayResult<ToggleResponse> {
        let path = format!("{}/toggle", habit_path(habit_id));
        let request = self.request(Method::PATCH, &path).json(&ToggleBody {
            day,
            month: month.month,
            year: month.year,
        });
        self.send(request).await
    }

    async fn rename_habit(&self, habit_id: &HabitId, name: &str) -> GatewayResult<Ack> {
        let request = self
            .request(Method::PATCH, &habit_path(habit_id))
            .json(&NameBody { name });
        self.send(request).await
    }

    async fn delete_habit(&self, habit_id: &HabitId) -> GatewayResult<Ack> {
        self.send(self.request(Method::DELETE, &habit_path(habit_id)))
            .await
    }
}
