//! The server dispatcher (`SPEC_FULL.md` §4.9): per-session read loop,
//! method lookup, invocation on the worker pool, and response write-back.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use rmpv::Value;

use crate::error::Error;
use crate::message::{pack_response, Message};
use crate::server::executor::{Executor, Outcome};
use crate::transport::tcp::{TcpSession, TcpSessionReader};
use crate::transport::udp::UdpSession;
use crate::worker_pool::WorkerPool;

pub type Registry = HashMap<String, Box<dyn Executor>>;

fn method_not_found(method: &str) -> Outcome {
    Outcome::Err(Value::from(format!("method not found: {method}")))
}

/// Look up and invoke `method`, returning the response's `(error, result)`
/// pair. Mirrors §4.9 step 2: an unregistered method synthesizes a
/// `MethodNotFound` error response rather than failing the session.
async fn invoke(registry: &Registry, method: &str, params: Vec<Value>) -> (Value, Value) {
    let outcome = match registry.get(method) {
        Some(executor) => executor.invoke(params).await,
        None => method_not_found(method),
    };
    match outcome {
        Outcome::Ok(result) => (Value::Nil, result),
        Outcome::Err(error) => (error, Value::Nil),
    }
}

/// Drive one accepted TCP session to completion: read, dispatch, respond,
/// re-arm, until EOF or a session-fatal error.
///
/// Requests are posted to the worker pool so a slow method doesn't block
/// the next read (§4.9: "multiple requests on the same session may execute
/// concurrently; responses are written back in completion order"). The
/// session write handle is cheap to clone, so each posted task gets its
/// own.
#[tracing::instrument(skip(reader, session, registry, pool), fields(peer = %session.peer_addr()))]
pub async fn run_tcp_session(
    session: TcpSession,
    mut reader: TcpSessionReader,
    registry: Arc<Registry>,
    pool: Arc<WorkerPool>,
) {
    loop {
        let raw = match reader.read_message().await {
            Ok(raw) => raw,
            Err(Error::Eof) => {
                tracing::debug!("session closed by peer");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "session read failed; removing session");
                break;
            }
        };

        match Message::decode(raw) {
            Ok(Message::Request {
                msgid,
                method,
                params,
                ..
            }) => {
                let registry = registry.clone();
                let session = session.clone();
                pool.post(async move {
                    let (error, result) = invoke(&registry, &method, params).await;
                    let response = pack_response(msgid, error, result);
                    if let Err(e) = session.write_message(response).await {
                        tracing::warn!(error = %e, "failed to write response");
                    }
                });
            }
            Ok(Message::Notification { method, params, .. }) => {
                let registry = registry.clone();
                pool.post(async move {
                    let _ = invoke(&registry, &method, params).await;
                });
            }
            Ok(Message::Response { .. }) => {
                tracing::warn!("received a response message on a server ingress session; closing");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "malformed message; closing session");
                break;
            }
        }
    }
}

/// Handle one inbound UDP datagram: decode, dispatch, and (for a request)
/// send exactly one reply datagram back to the sender.
#[tracing::instrument(skip(pseudo_session, registry, pool), fields(peer = %pseudo_session.peer_addr()))]
pub async fn run_udp_pseudo_session(
    pseudo_session: UdpSession,
    registry: Arc<Registry>,
    pool: Arc<WorkerPool>,
) {
    let raw: Bytes = match pseudo_session.read_message().await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, "failed to read udp datagram");
            return;
        }
    };

    match Message::decode(raw) {
        Ok(Message::Request {
            msgid,
            method,
            params,
            ..
        }) => {
            pool.post(async move {
                let (error, result) = invoke(&registry, &method, params).await;
                let response = pack_response(msgid, error, result);
                if let Err(e) = pseudo_session.write_message(response).await {
                    tracing::warn!(error = %e, "failed to write udp response");
                }
            });
        }
        Ok(Message::Notification { method, params, .. }) => {
            pool.post(async move {
                let _ = invoke(&registry, &method, params).await;
            });
        }
        Ok(Message::Response { .. }) => {
            tracing::warn!("received a response datagram on a server ingress socket; dropping");
        }
        Err(e) => {
            tracing::warn!(error = %e, "malformed datagram; dropping");
        }
    }
}
