//! Invocation plumbing: the initiator's outbox and the executor path.
//!
//! Call payload:     `rpc u16 | call u64 | wants_response bool | args…`
//! Response payload: `call u64 | status u8 | return value (status OK only)`
//!
//! Payloads are opaque bytes to the replication layer, which frames them
//! as `RpcCall` / `RpcResponse` control records.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};

use tokio::sync::oneshot;
use tracing::{debug, warn};

use tether_replication::World;
use tether_wire::{SerialBuffer, Side, WireError};

use crate::{CallId, RpcContext, RpcError, RpcId, RpcRegistry, RpcType, RpcValue};

const STATUS_OK: u8 = 0;
const STATUS_DECODE_FAILED: u8 = 1;
const STATUS_EXECUTION_FAILED: u8 = 2;
const STATUS_REJECTED: u8 = 3;

/// Payloads are bounded by the control-record length prefix.
const MAX_PAYLOAD: usize = u16::MAX as usize;

type ResponseSlot = oneshot::Sender<Result<Option<RpcValue>, RpcError>>;

/// The eventual response of one invocation. Consumed at most once, like
/// a dispatcher pending call.
#[derive(Debug)]
pub struct PendingRpc {
    rx: Option<oneshot::Receiver<Result<Option<RpcValue>, RpcError>>>,
}

impl PendingRpc {
    fn new(rx: oneshot::Receiver<Result<Option<RpcValue>, RpcError>>) -> Self {
        Self { rx: Some(rx) }
    }

    /// Waits for the response and takes it. Async form.
    pub async fn wait(&mut self) -> Result<Option<RpcValue>, RpcError> {
        match self.rx.take() {
            Some(rx) => rx.await.unwrap_or(Err(RpcError::Cancelled)),
            None => Err(RpcError::AlreadyTaken),
        }
    }

    /// Waits for the response, blocking the calling thread. Must not be
    /// called from inside the async runtime.
    pub fn wait_blocking(&mut self) -> Result<Option<RpcValue>, RpcError> {
        match self.rx.take() {
            Some(rx) => rx.blocking_recv().unwrap_or(Err(RpcError::Cancelled)),
            None => Err(RpcError::AlreadyTaken),
        }
    }

    /// Non-blocking poll. `None` until the response arrives, and `None`
    /// forever after it was taken.
    pub fn try_take(&mut self) -> Option<Result<Option<RpcValue>, RpcError>> {
        let rx = self.rx.as_mut()?;
        match rx.try_recv() {
            Ok(outcome) => {
                self.rx = None;
                Some(outcome)
            }
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.rx = None;
                Some(Err(RpcError::Cancelled))
            }
        }
    }
}

/// Initiator-side state for one connection: queued call payloads and the
/// in-flight table responses resolve against.
///
/// Owned by the simulation loop; the connection driver drains
/// [`take_outgoing`](Self::take_outgoing) into each packet and feeds
/// received response payloads back through
/// [`handle_response`](Self::handle_response).
pub struct RpcOutbox {
    local: Side,
    next_call: u64,
    queued: Vec<Vec<u8>>,
    pending: HashMap<CallId, (ResponseSlot, Option<RpcType>)>,
}

impl RpcOutbox {
    /// An empty outbox for the given local side.
    pub fn new(local: Side) -> Self {
        Self {
            local,
            next_call: 1,
            queued: Vec::new(),
            pending: HashMap::new(),
        }
    }

    /// Queues an invocation of `name` with `args`.
    ///
    /// Returns `Ok(Some(..))` with a response handle when the procedure
    /// expects one, `Ok(None)` for fire-and-forget procedures. The
    /// direction restriction is enforced here too: a procedure that
    /// executes on this side cannot be sent to the peer.
    pub fn call(
        &mut self,
        registry: &RpcRegistry,
        name: &str,
        args: Vec<RpcValue>,
    ) -> Result<Option<PendingRpc>, RpcError> {
        let descriptor = registry
            .by_name(name)
            .ok_or_else(|| RpcError::UnknownName(name.to_string()))?;
        if descriptor.executes_on == self.local {
            return Err(RpcError::Direction {
                rpc: descriptor.id,
                executes_on: descriptor.executes_on,
                attempted: self.local.opposite(),
            });
        }
        if args.len() != descriptor.args.len() {
            return Err(RpcError::ArgumentMismatch(format!(
                "\"{name}\" takes {} arguments, got {}",
                descriptor.args.len(),
                args.len()
            )));
        }
        for (i, (value, expected)) in args.iter().zip(&descriptor.args).enumerate() {
            if value.ty() != *expected {
                return Err(RpcError::ArgumentMismatch(format!(
                    "\"{name}\" argument {i} is {}, got {}",
                    expected,
                    value.ty()
                )));
            }
        }

        let call = CallId(self.next_call);
        self.next_call += 1;

        let mut buf = SerialBuffer::with_capacity(MAX_PAYLOAD);
        buf.put_u16(descriptor.id.0)?;
        buf.put_u64(call.0)?;
        buf.put_bool(descriptor.wants_response)?;
        for value in &args {
            value.write(&mut buf)?;
        }
        self.queued.push(buf.as_written().to_vec());

        if descriptor.wants_response {
            let (tx, rx) = oneshot::channel();
            self.pending.insert(call, (tx, descriptor.returns));
            Ok(Some(PendingRpc::new(rx)))
        } else {
            Ok(None)
        }
    }

    /// Drains the call payloads queued since the last packet.
    pub fn take_outgoing(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.queued)
    }

    /// Resolves one received response payload against the in-flight table.
    pub fn handle_response(&mut self, payload: &[u8]) {
        let mut buf = SerialBuffer::with_capacity(payload.len().max(1));
        if buf.load(payload).is_err() {
            warn!("oversized rpc response payload dropped");
            return;
        }
        let (call, status) = match (buf.get_u64(), buf.get_u8()) {
            (Ok(call), Ok(status)) => (CallId(call), status),
            _ => {
                warn!("truncated rpc response payload dropped");
                return;
            }
        };
        let Some((slot, return_type)) = self.pending.remove(&call) else {
            debug!(%call, "response for unknown call ignored");
            return;
        };

        let outcome = match status {
            STATUS_OK => match return_type {
                Some(ty) => RpcValue::read(ty, &mut buf)
                    .map(Some)
                    .map_err(RpcError::Decode),
                None => Ok(None),
            },
            STATUS_DECODE_FAILED => Err(RpcError::RemoteDecode),
            STATUS_EXECUTION_FAILED => Err(RpcError::RemoteExecution),
            STATUS_REJECTED => Err(RpcError::RemoteRejected),
            other => Err(RpcError::Decode(WireError::Malformed(format!(
                "rpc response status 0x{other:02x}"
            )))),
        };
        // Initiator may have dropped the handle; that is fine.
        let _ = slot.send(outcome);
    }

    /// Fails every in-flight call. Called when the connection dies.
    pub fn cancel_all(&mut self) {
        for (_, (slot, _)) in self.pending.drain() {
            let _ = slot.send(Err(RpcError::Cancelled));
        }
    }

    /// Calls still waiting for a response.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }
}

fn failure_response(call: CallId, wants_response: bool, status: u8) -> Option<Vec<u8>> {
    if wants_response {
        encode_response(call, status, None)
    } else {
        None
    }
}

fn encode_response(call: CallId, status: u8, value: Option<&RpcValue>) -> Option<Vec<u8>> {
    let mut buf = SerialBuffer::with_capacity(MAX_PAYLOAD);
    let encoded = (|| -> Result<(), WireError> {
        buf.put_u64(call.0)?;
        buf.put_u8(status)?;
        if let Some(value) = value {
            value.write(&mut buf)?;
        }
        Ok(())
    })();
    match encoded {
        Ok(()) => Some(buf.as_written().to_vec()),
        Err(e) => {
            warn!(%call, error = %e, "rpc response did not fit, dropped");
            None
        }
    }
}

/// Executes one received call payload against the live world.
///
/// Runs on the simulation loop. Returns the encoded response payload to
/// send back, or `None` for fire-and-forget calls. Every failure mode is
/// handled here — decode failures and procedure errors become error
/// responses (when a response was requested), never a crash of the
/// calling driver.
pub fn execute_call(
    registry: &RpcRegistry,
    world: &mut World,
    local: Side,
    ctx: &RpcContext,
    payload: &[u8],
) -> Option<Vec<u8>> {
    let mut buf = SerialBuffer::with_capacity(payload.len().max(1));
    if buf.load(payload).is_err() {
        warn!("oversized rpc call payload dropped");
        return None;
    }
    let header = (|| -> Result<(RpcId, CallId, bool), WireError> {
        let rpc = RpcId(buf.get_u16()?);
        let call = CallId(buf.get_u64()?);
        let wants_response = buf.get_bool()?;
        Ok((rpc, call, wants_response))
    })();
    let Ok((rpc, call, wants_response)) = header else {
        warn!("truncated rpc call payload dropped");
        return None;
    };

    let Some(descriptor) = registry.descriptor(rpc) else {
        warn!(%rpc, "call for unregistered rpc");
        return failure_response(call, wants_response, STATUS_REJECTED);
    };

    // Direction restriction, checked before a single argument is decoded:
    // a server-only procedure must never run on a client, and vice versa.
    if descriptor.executes_on != local {
        warn!(
            %rpc,
            executes_on = %descriptor.executes_on,
            attempted = %local,
            "rpc dispatched to the wrong side"
        );
        return failure_response(call, wants_response, STATUS_REJECTED);
    }

    let mut args = Vec::with_capacity(descriptor.args.len());
    for ty in &descriptor.args {
        match RpcValue::read(*ty, &mut buf) {
            Ok(value) => args.push(value),
            Err(e) => {
                debug!(%rpc, %call, error = %e, "rpc arguments failed to decode");
                return failure_response(call, wants_response, STATUS_DECODE_FAILED);
            }
        }
    }

    let outcome = catch_unwind(AssertUnwindSafe(|| (descriptor.handler)(world, ctx, args)));
    let value = match outcome {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            debug!(%rpc, %call, error = %e, "rpc handler failed");
            return failure_response(call, wants_response, STATUS_EXECUTION_FAILED);
        }
        Err(_) => {
            warn!(%rpc, %call, "rpc handler panicked");
            return failure_response(call, wants_response, STATUS_EXECUTION_FAILED);
        }
    };

    if !wants_response {
        return None;
    }
    match (&value, descriptor.returns) {
        (Some(v), Some(ty)) if v.ty() != ty => {
            warn!(%rpc, %call, "handler returned a value of the wrong type");
            encode_response(call, STATUS_EXECUTION_FAILED, None)
        }
        (Some(v), Some(_)) => encode_response(call, STATUS_OK, Some(v)),
        (None, _) => encode_response(call, STATUS_OK, None),
        (Some(_), None) => {
            warn!(%rpc, %call, "handler returned a value for a void rpc");
            encode_response(call, STATUS_EXECUTION_FAILED, None)
        }
    }
}
