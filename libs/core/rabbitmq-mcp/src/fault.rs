//! Fault extraction
//!
//! A failed message can describe its failure in two ways:
//!
//! - **Headers**: the error-routing middleware stamps `MT-Fault-*` and
//!   `MT-Host-*` headers when it moves a message to `<queue>_error`.
//! - **Body**: the payload is a fault wrapper whose `message` carries an
//!   `exceptions` array, the original `message`, and fault metadata.
//!
//! Strategies run in that order and the first hit wins in full; results
//! from different strategies are never merged.

use crate::envelope::{Envelope, HostInfo, decode_type_name, scalar_field, scalar_string, string_list};
use crate::types::{Headers, Message};
use serde_json::Value;

/// Exception chains deeper than this are cut off
pub const MAX_EXCEPTION_DEPTH: usize = 10;

pub mod headers {
    pub const REASON: &str = "MT-Reason";
    pub const EXCEPTION_TYPE: &str = "MT-Fault-ExceptionType";
    pub const MESSAGE: &str = "MT-Fault-Message";
    pub const TIMESTAMP: &str = "MT-Fault-Timestamp";
    pub const CONSUMER_TYPE: &str = "MT-Fault-ConsumerType";
    pub const INPUT_ADDRESS: &str = "MT-Fault-InputAddress";
    pub const MESSAGE_TYPE: &str = "MT-Fault-MessageType";
    pub const RETRY_COUNT: &str = "MT-Fault-RetryCount";
    pub const STACK_TRACE: &str = "MT-Fault-StackTrace";
    pub const HOST_MACHINE_NAME: &str = "MT-Host-MachineName";
    pub const HOST_PROCESS_NAME: &str = "MT-Host-ProcessName";
    pub const HOST_PROCESS_ID: &str = "MT-Host-ProcessId";
    pub const HOST_ASSEMBLY: &str = "MT-Host-Assembly";
    pub const HOST_ASSEMBLY_VERSION: &str = "MT-Host-AssemblyVersion";
    pub const HOST_FRAMEWORK_VERSION: &str = "MT-Host-FrameworkVersion";
    pub const HOST_RUNTIME_VERSION: &str = "MT-Host-MassTransitVersion";
    pub const HOST_OS_VERSION: &str = "MT-Host-OperatingSystemVersion";
}

/// One exception, possibly wrapping another
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionRecord {
    pub exception_type: Option<String>,
    pub message: Option<String>,
    pub stack_trace: Option<String>,
    pub source: Option<String>,
    pub inner: Option<Box<ExceptionRecord>>,
}

impl ExceptionRecord {
    /// Project an `ExceptionInfo`-shaped object, following `innerException`
    /// up to [`MAX_EXCEPTION_DEPTH`] levels.
    pub fn from_value(value: &Value) -> Self {
        Self::project(value, 1)
    }

    fn project(value: &Value, depth: usize) -> Self {
        let Some(object) = value.as_object() else {
            return Self {
                message: scalar_string(value),
                ..Default::default()
            };
        };

        let inner = if depth < MAX_EXCEPTION_DEPTH {
            object
                .get("innerException")
                .filter(|v| v.is_object())
                .map(|v| Box::new(Self::project(v, depth + 1)))
        } else {
            None
        };

        Self {
            exception_type: scalar_field(object, "exceptionType"),
            message: scalar_field(object, "message"),
            stack_trace: scalar_field(object, "stackTrace"),
            source: scalar_field(object, "source"),
            inner,
        }
    }

    /// Wrapped exceptions, outermost first, bounded by [`MAX_EXCEPTION_DEPTH`]
    pub fn causes(&self) -> impl Iterator<Item = &ExceptionRecord> {
        std::iter::successors(self.inner.as_deref(), |e| e.inner.as_deref())
            .take(MAX_EXCEPTION_DEPTH - 1)
    }
}

/// Which strategy produced a fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultSource {
    Headers,
    Body,
}

/// Normalized failure record, independent of how it was encoded
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    pub source: FaultSource,
    pub faulted_at: Option<String>,
    pub original_message_id: Option<String>,
    pub reason: Option<String>,
    pub consumer_type: Option<String>,
    pub input_address: Option<String>,
    pub retry_count: Option<u32>,
    /// Display name, already decoded from URN form where applicable
    pub message_type: Option<String>,
    /// Primary exception first
    pub exceptions: Vec<ExceptionRecord>,
    pub original_payload: Option<Value>,
    pub host: Option<HostInfo>,
}

impl Fault {
    fn empty(source: FaultSource) -> Self {
        Self {
            source,
            faulted_at: None,
            original_message_id: None,
            reason: None,
            consumer_type: None,
            input_address: None,
            retry_count: None,
            message_type: None,
            exceptions: Vec::new(),
            original_payload: None,
            host: None,
        }
    }

    pub fn primary_exception(&self) -> Option<&ExceptionRecord> {
        self.exceptions.first()
    }
}

type Strategy = fn(&Message, Option<&Envelope>) -> Option<Fault>;

/// Extraction strategies in precedence order
const STRATEGIES: [Strategy; 2] = [from_headers, from_body];

/// Run the strategies in order; the first fault found is returned whole.
pub fn extract_fault(message: &Message, envelope: Option<&Envelope>) -> Option<Fault> {
    STRATEGIES
        .iter()
        .find_map(|strategy| strategy(message, envelope))
}

/// Header strategy: recognized when `MT-Reason` or `MT-Fault-ExceptionType` is set.
pub fn from_headers(message: &Message, envelope: Option<&Envelope>) -> Option<Fault> {
    let h = message.headers();
    if !h.contains_key(headers::REASON) && !h.contains_key(headers::EXCEPTION_TYPE) {
        return None;
    }

    let exception = ExceptionRecord {
        exception_type: header(h, headers::EXCEPTION_TYPE),
        message: header(h, headers::MESSAGE),
        stack_trace: header(h, headers::STACK_TRACE),
        ..Default::default()
    };
    let exceptions = if exception == ExceptionRecord::default() {
        Vec::new()
    } else {
        vec![exception]
    };

    let host = HostInfo {
        machine_name: header(h, headers::HOST_MACHINE_NAME),
        process_name: header(h, headers::HOST_PROCESS_NAME),
        process_id: header(h, headers::HOST_PROCESS_ID),
        assembly: header(h, headers::HOST_ASSEMBLY),
        assembly_version: header(h, headers::HOST_ASSEMBLY_VERSION),
        framework_version: header(h, headers::HOST_FRAMEWORK_VERSION),
        runtime_version: header(h, headers::HOST_RUNTIME_VERSION),
        os_version: header(h, headers::HOST_OS_VERSION),
    };

    Some(Fault {
        faulted_at: header(h, headers::TIMESTAMP),
        reason: header(h, headers::REASON),
        consumer_type: header(h, headers::CONSUMER_TYPE),
        input_address: header(h, headers::INPUT_ADDRESS),
        retry_count: h.get(headers::RETRY_COUNT).and_then(parse_count),
        message_type: header(h, headers::MESSAGE_TYPE)
            .or_else(|| envelope.and_then(Envelope::primary_type_name)),
        exceptions,
        original_payload: envelope.and_then(|e| e.message.clone()),
        host: (!host.is_empty()).then_some(host),
        ..Fault::empty(FaultSource::Headers)
    })
}

/// Body strategy: recognized when the envelope's `message.exceptions` is a
/// non-empty array.
pub fn from_body(_message: &Message, envelope: Option<&Envelope>) -> Option<Fault> {
    let envelope = envelope?;
    let body = envelope.message_object()?;
    let exceptions = body
        .get("exceptions")
        .and_then(Value::as_array)
        .filter(|items| !items.is_empty())?;

    let message_type = string_list(body.get("faultMessageTypes"))
        .first()
        .map(|urn| decode_type_name(urn))
        .or_else(|| envelope.primary_type_name());

    let host = envelope.host.clone().or_else(|| {
        body.get("host")
            .and_then(Value::as_object)
            .and_then(HostInfo::from_object)
    });

    Some(Fault {
        faulted_at: scalar_field(body, "timestamp"),
        original_message_id: scalar_field(body, "faultedMessageId"),
        message_type,
        exceptions: exceptions.iter().map(ExceptionRecord::from_value).collect(),
        original_payload: body.get("message").filter(|v| !v.is_null()).cloned(),
        host,
        ..Fault::empty(FaultSource::Body)
    })
}

fn header(headers: &Headers, key: &str) -> Option<String> {
    headers.get(key).and_then(scalar_string)
}

fn parse_count(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
