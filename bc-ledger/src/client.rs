use crate::error::{LedgerError, Result};
use crate::types::{
    GraphQlResponse, HISTORY_QUERY, HistoryData, PROFILE_QUERY, RESOLVE_QUERY, ResolveData,
    TRANSFER_MUTATION, TransferData, UserData,
};
use async_trait::async_trait;
use bc_core::{
    AccountId, AccountProfile, GatewayError, LedgerGateway, Registration, SettlementRecord,
    TransferRequest, UserId,
};
use reqwest::Url;
use serde::de::DeserializeOwned;
use std::time::Duration;

const TELEGRAM_ID_HEADER: &str = "X-Telegram-Id";

/// GraphQL client for the bank API.
#[derive(Clone)]
pub struct LedgerClient {
    http: reqwest::Client,
    graphql_url: Url,
    register_url: Url,
}

impl LedgerClient {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(api_url: &str, timeout: Duration) -> Result<Self> {
        let base = normalize_base_url(api_url)?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            graphql_url: join(&base, "graphql")?,
            register_url: join(&base, "register")?,
        })
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn graphql<T: DeserializeOwned>(
        &self,
        caller: Option<UserId>,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T> {
        let mut request = self.http.post(self.graphql_url.clone()).json(&serde_json::json!({
            "query": query,
            "variables": variables,
        }));
        if let Some(caller) = caller {
            request = request.header(TELEGRAM_ID_HEADER, caller.to_string());
        }

        let resp = request.send().await?;
        let status = resp.status();
        if status.is_server_error() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LedgerError::Status {
                status: status.as_u16(),
                body,
            });
        }
        // GraphQL servers report resolver errors with 200 or 4xx; both carry an `errors` array.
        let body = resp.text().await?;
        let parsed: GraphQlResponse<T> = serde_json::from_str(&body).map_err(|e| {
            if status.is_success() {
                LedgerError::from(e)
            } else {
                LedgerError::Status {
                    status: status.as_u16(),
                    body: body.clone(),
                }
            }
        })?;
        parsed.into_data()
    }
}

fn normalize_base_url(api_url: &str) -> Result<Url> {
    let trimmed = api_url.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::InvalidInput("ledger api_url is empty".to_string()));
    }
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    let url = Url::parse(&with_slash)
        .map_err(|e| LedgerError::InvalidInput(format!("ledger api_url {trimmed:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(LedgerError::InvalidInput(format!(
            "ledger api_url must be http(s), got {other}"
        ))),
    }
}

fn join(base: &Url, path: &str) -> Result<Url> {
    base.join(path)
        .map_err(|e| LedgerError::InvalidInput(format!("join {path}: {e}")))
}

/// Map a client failure onto the domain taxonomy. GraphQL errors are the
/// ledger's own verdict; everything else means the ledger was not reached
/// or answered nonsense.
fn to_gateway(error: LedgerError) -> GatewayError {
    match error {
        LedgerError::GraphQl(_) => GatewayError::Business(error.first_message()),
        LedgerError::ResponseFormat(message) => GatewayError::ResponseFormat(message),
        other => GatewayError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl LedgerGateway for LedgerClient {
    fn backend(&self) -> &str {
        "graphql"
    }

    #[tracing::instrument(level = "debug", skip_all, fields(user_id = %user))]
    async fn resolve_account(&self, user: UserId) -> bc_core::Result<AccountId> {
        let data: ResolveData = match self
            .graphql(
                Some(user),
                RESOLVE_QUERY,
                serde_json::json!({ "telegramId": user.to_string() }),
            )
            .await
        {
            Ok(data) => data,
            // The bank answers an unknown telegram id with a resolver error.
            Err(LedgerError::GraphQl(messages)) => {
                tracing::debug!(?messages, "telegram id not registered");
                return Err(GatewayError::NotRegistered(user));
            }
            Err(other) => return Err(to_gateway(other)),
        };
        data.account_id().ok_or(GatewayError::NotRegistered(user))
    }

    #[tracing::instrument(level = "debug", skip_all, fields(account = %account))]
    async fn get_account(&self, account: &AccountId) -> bc_core::Result<AccountProfile> {
        let data: UserData = self
            .graphql(None, PROFILE_QUERY, serde_json::json!({ "id": account.as_str() }))
            .await
            .map_err(to_gateway)?;
        data.user
            .map(|user| user.into_profile())
            .ok_or_else(|| GatewayError::ResponseFormat(format!("no user {account}")))
    }

    #[tracing::instrument(level = "debug", skip_all, fields(account = %account))]
    async fn get_history(&self, account: &AccountId) -> bc_core::Result<Vec<SettlementRecord>> {
        let data: HistoryData = self
            .graphql(None, HISTORY_QUERY, serde_json::json!({ "id": account.as_str() }))
            .await
            .map_err(to_gateway)?;
        let user = data
            .user
            .ok_or_else(|| GatewayError::ResponseFormat(format!("no user {account}")))?;
        Ok(user
            .transactions
            .into_iter()
            .map(|t| t.into_record())
            .collect())
    }

    #[tracing::instrument(level = "info", skip_all, fields(handle = %request.origin_handle))]
    async fn transfer(&self, request: TransferRequest) -> bc_core::Result<SettlementRecord> {
        let variables = serde_json::json!({
            "money": request.amount.get(),
            "fromUserId": request.from.as_str(),
            "toUserId": request.to.as_str(),
            "message": request.note.as_deref().unwrap_or_default(),
            "queryId": request.origin_handle.as_str(),
        });
        let data: TransferData = self
            .graphql(None, TRANSFER_MUTATION, variables)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "ledger transfer failed");
                to_gateway(e)
            })?;
        data.transfer
            .map(|t| t.into_record())
            .ok_or_else(|| GatewayError::ResponseFormat("transfer returned no record".to_string()))
    }

    #[tracing::instrument(level = "info", skip_all, fields(user_id = %registration.platform_id))]
    async fn register_user(&self, registration: Registration) -> bc_core::Result<AccountId> {
        let form = [
            ("name", registration.name.clone()),
            ("telegram_id", registration.platform_id.to_string()),
            (
                "username",
                registration.username.clone().unwrap_or_default(),
            ),
        ];
        let resp = self
            .http
            .post(self.register_url.clone())
            .form(&form)
            .send()
            .await
            .map_err(|e| to_gateway(e.into()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            if status.is_client_error() {
                return Err(GatewayError::Business(body));
            }
            return Err(to_gateway(LedgerError::Status {
                status: status.as_u16(),
                body,
            }));
        }
        self.resolve_account(registration.platform_id).await
    }
}
