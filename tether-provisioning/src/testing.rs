use std::collections::VecDeque;
use std::sync::Mutex;

use serde_json::Value;

use super::contract::{ContractError, ProvisioningContract, RequestData};
use super::mailbox::{ContractResponse, Responder};

/// How the fake service answers a request
pub(crate) enum Reply {
    Body(ContractResponse),
    Fail(ContractError),
    /// Drop the responder without answering
    Drop,
    /// Keep the responder and never answer
    Hang,
}

pub(crate) fn json_reply(body: Value) -> Reply {
    Reply::Body(ContractResponse::new(body.to_string().into_bytes()))
}

/// Scripted provisioning service.
///
/// Each request kind pops the next scripted reply, responding from a
/// separate thread. Unscripted requests are dropped.
#[derive(Default)]
pub(crate) struct FakeContract {
    nonce: Mutex<VecDeque<Reply>>,
    register: Mutex<VecDeque<Reply>>,
    status: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<(&'static str, RequestData)>>,
    hanging: Mutex<Vec<Responder>>,
}

impl FakeContract {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_nonce(&self, reply: Reply) {
        self.nonce.lock().unwrap().push_back(reply);
    }

    pub fn on_register(&self, reply: Reply) {
        self.register.lock().unwrap().push_back(reply);
    }

    pub fn on_status(&self, reply: Reply) {
        self.status.lock().unwrap().push_back(reply);
    }

    pub fn requests(&self) -> Vec<(&'static str, RequestData)> {
        self.requests.lock().unwrap().clone()
    }

    fn answer(
        &self,
        kind: &'static str,
        queue: &Mutex<VecDeque<Reply>>,
        request: RequestData,
        responder: Responder,
    ) -> Result<(), ContractError> {
        self.requests.lock().unwrap().push((kind, request));
        match queue.lock().unwrap().pop_front() {
            Some(Reply::Body(response)) => {
                std::thread::spawn(move || responder.respond(response));
            }
            Some(Reply::Fail(err)) => {
                std::thread::spawn(move || responder.fail(err));
            }
            Some(Reply::Hang) => self.hanging.lock().unwrap().push(responder),
            Some(Reply::Drop) | None => drop(responder),
        }
        Ok(())
    }
}

impl ProvisioningContract for FakeContract {
    fn request_nonce(
        &self,
        request: RequestData,
        responder: Responder,
    ) -> Result<(), ContractError> {
        self.answer("request_nonce", &self.nonce, request, responder)
    }

    fn authenticate(&self, request: RequestData, responder: Responder) -> Result<(), ContractError> {
        self.answer("authenticate", &self.register, request, responder)
    }

    fn get_registration_status(
        &self,
        request: RequestData,
        responder: Responder,
    ) -> Result<(), ContractError> {
        self.answer("get_registration_status", &self.status, request, responder)
    }
}
