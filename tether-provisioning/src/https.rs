use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Identity, Method, RequestBuilder, StatusCode};
use tokio::runtime::Handle;
use tracing::{Instrument, Span, debug, debug_span, field};

use crate::util::http::Uri;

use super::contract::{ContractError, ProvisioningContract, RequestData};
use super::mailbox::{ContractResponse, Responder};
use super::sas::url_encode;

const API_VERSION: &str = "2019-03-31";

/// Public endpoint shared by all provisioning service instances
pub const GLOBAL_ENDPOINT: &str = "https://global.azure-devices-provisioning.net";

/// The provisioning service contract over HTTPS.
///
/// Requests run as tasks on the runtime the contract was created in.
#[derive(Clone, Debug)]
pub struct HttpsContract {
    endpoint: Uri,
    scope_id: String,
    client: Client,
    runtime: Handle,
}

/// Statuses that carry a response body for the caller
#[derive(Clone, Copy, Debug)]
enum Expect {
    Success,
    // the nonce challenge arrives as an authorization failure
    Challenge,
}

impl HttpsContract {
    /// Must be called from within a tokio runtime
    pub fn new(endpoint: Uri, scope_id: impl Into<String>) -> Result<Self, ContractError> {
        let scope_id = scope_id.into();
        if scope_id.trim().is_empty() {
            return Err(ContractError::InvalidArgument(
                "scope id cannot be empty".into(),
            ));
        }
        let runtime = Handle::try_current()
            .map_err(|err| ContractError::Unavailable(format!("no async runtime: {err}")))?;

        Ok(Self {
            endpoint,
            scope_id,
            client: Client::new(),
            runtime,
        })
    }

    fn registration_uri(&self, registration_id: &str, suffix: &str) -> Result<Uri, ContractError> {
        let path = format!(
            "/{}/registrations/{}/{suffix}",
            url_encode(&self.scope_id),
            url_encode(registration_id)
        );
        let query = format!("api-version={API_VERSION}");
        Ok(Uri::from_parts(self.endpoint.clone(), &path, Some(&query))?)
    }

    fn client_for(&self, request: &RequestData) -> Result<Client, ContractError> {
        match &request.tls_identity {
            Some(identity) => {
                let identity = Identity::from_pem(identity.pem())?;
                Ok(Client::builder().identity(identity).build()?)
            }
            None => Ok(self.client.clone()),
        }
    }

    fn prepare(
        &self,
        method: Method,
        uri: Uri,
        request: RequestData,
    ) -> Result<RequestBuilder, ContractError> {
        if request.registration_id.trim().is_empty() {
            return Err(ContractError::InvalidArgument(
                "registration id cannot be empty".into(),
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        if let Some(token) = &request.sas_token {
            let token = HeaderValue::from_str(token).map_err(|err| {
                ContractError::InvalidArgument(format!("invalid SAS token: {err}"))
            })?;
            headers.insert(AUTHORIZATION, token);
        }

        let builder = self
            .client_for(&request)?
            .request(method, uri.to_string())
            .headers(headers);

        Ok(match request.payload {
            Some(payload) => builder.body(payload),
            None => builder,
        })
    }

    fn dispatch(&self, request: RequestBuilder, expect: Expect, responder: Responder) {
        let span = debug_span!("request", status = field::Empty);
        self.runtime.spawn(
            async move {
                match send(request, expect).await {
                    Ok(response) => responder.respond(response),
                    Err(err) => {
                        debug!("request failed: {err}");
                        responder.fail(err)
                    }
                }
            }
            .instrument(span),
        );
    }

    fn register(
        &self,
        request: RequestData,
        expect: Expect,
        responder: Responder,
    ) -> Result<(), ContractError> {
        if request.payload.is_none() {
            return Err(ContractError::InvalidArgument(
                "registration payload cannot be empty".into(),
            ));
        }
        let uri = self.registration_uri(&request.registration_id, "register")?;
        debug!(%uri, "registering");
        let builder = self.prepare(Method::PUT, uri, request)?;
        self.dispatch(builder, expect, responder);
        Ok(())
    }
}

async fn send(request: RequestBuilder, expect: Expect) -> Result<ContractResponse, ContractError> {
    let response = request.send().await?;
    let status = response.status();
    Span::current().record("status", field::display(status));

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.bytes().await?.to_vec();

    let accepted = match expect {
        Expect::Success => status.is_success(),
        Expect::Challenge => status == StatusCode::UNAUTHORIZED,
    };
    if !accepted {
        if matches!(expect, Expect::Challenge) && status.is_success() {
            return Err(ContractError::Unexpected(
                "service did not return an authorization challenge".into(),
            ));
        }
        return Err(ContractError::Status(
            status,
            String::from_utf8_lossy(&body).into_owned(),
        ));
    }

    Ok(ContractResponse { body, retry_after })
}

impl ProvisioningContract for HttpsContract {
    fn request_nonce(
        &self,
        request: RequestData,
        responder: Responder,
    ) -> Result<(), ContractError> {
        self.register(request, Expect::Challenge, responder)
    }

    fn authenticate(&self, request: RequestData, responder: Responder) -> Result<(), ContractError> {
        self.register(request, Expect::Success, responder)
    }

    fn get_registration_status(
        &self,
        request: RequestData,
        responder: Responder,
    ) -> Result<(), ContractError> {
        let operation_id = request
            .operation_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ContractError::InvalidArgument("operation id cannot be empty".into()))?;

        let uri = self.registration_uri(
            &request.registration_id,
            &format!("operations/{}", url_encode(&operation_id)),
        )?;
        debug!(%uri, "querying registration status");
        let builder = self.prepare(Method::GET, uri, request)?;
        self.dispatch(builder, Expect::Success, responder);
        Ok(())
    }
}
