use std::time::Duration;

use tokio::sync::oneshot;
use tracing::trace;

use super::contract::ContractError;
use super::error::ProvisioningError;

/// A raw response from the provisioning service
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContractResponse {
    pub body: Vec<u8>,
    /// How long the service asked us to wait before polling again
    pub retry_after: Option<Duration>,
}

impl ContractResponse {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

/// Write side of a mailbox, handed to the contract with each request.
///
/// Consumed on use, so a mailbox receives at most one response.
#[derive(Debug)]
pub struct Responder(oneshot::Sender<Result<ContractResponse, ContractError>>);

/// Read side of a mailbox
#[derive(Debug)]
pub struct Mailbox(oneshot::Receiver<Result<ContractResponse, ContractError>>);

/// Create a fresh mailbox for a single request
pub fn channel() -> (Responder, Mailbox) {
    let (tx, rx) = oneshot::channel();
    (Responder(tx), Mailbox(rx))
}

impl Responder {
    pub fn respond(self, response: ContractResponse) {
        if self.0.send(Ok(response)).is_err() {
            trace!("response dropped, nobody is waiting for it");
        }
    }

    pub fn fail(self, err: ContractError) {
        if self.0.send(Err(err)).is_err() {
            trace!("failure dropped, nobody is waiting for it");
        }
    }
}

impl Mailbox {
    /// Wait for the response.
    ///
    /// If the responder is dropped without answering, the request
    /// was abandoned and the wait is interrupted.
    pub async fn wait(self) -> Result<ContractResponse, ProvisioningError> {
        match self.0.await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(ProvisioningError::Interrupted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn it_delivers_the_response_written_from_another_thread() {
        let (responder, mailbox) = channel();

        std::thread::spawn(move || {
            responder.respond(
                ContractResponse::new(b"{}".to_vec()).with_retry_after(Duration::from_secs(2)),
            );
        });

        let response = mailbox.wait().await.unwrap();
        assert_eq!(response.body, b"{}");
        assert_eq!(response.retry_after, Some(Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn it_delivers_contract_failures() {
        let (responder, mailbox) = channel();
        responder.fail(ContractError::Unexpected("no challenge".into()));

        let res = mailbox.wait().await;
        assert!(matches!(res, Err(ProvisioningError::Contract(_))));
    }

    #[tokio::test]
    async fn dropping_the_responder_interrupts_the_wait() {
        let (responder, mailbox) = channel();
        drop(responder);

        let res = mailbox.wait().await;
        assert!(matches!(res, Err(ProvisioningError::Interrupted)));
    }

    #[test]
    fn responding_after_the_reader_left_is_harmless() {
        let (responder, mailbox) = channel();
        drop(mailbox);
        responder.respond(ContractResponse::new(Vec::new()));
    }
}
