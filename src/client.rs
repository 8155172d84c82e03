//! aREST command encoding, response decoding, and the capability interface.
//!
//! Device adapters (LEDs, buttons, relays) and alternative backends only ever
//! see the [`Arest`] trait.

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::{ArestError, ArestResult};
use crate::transport::{ResponseFrame, SerialTransport, Transport, TransportConfig};
use crate::types::{Level, Mode};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

/// Operations an aREST board offers.
///
/// Every operation checks `cancel` first and returns `Cancelled` without any
/// I/O if it has already fired.
#[async_trait]
pub trait Arest: Send + Sync {
    async fn set_pin_mode(&self, cancel: &CancelToken, pin: u8, mode: Mode) -> ArestResult<()>;

    async fn digital_write(&self, cancel: &CancelToken, pin: u8, level: Level) -> ArestResult<()>;

    async fn digital_read(&self, cancel: &CancelToken, pin: u8) -> ArestResult<Level>;

    /// Read one exposed variable. `NotFound` if the response lacks `name`.
    async fn read_value(&self, cancel: &CancelToken, name: &str) -> ArestResult<Value>;

    /// Read all exposed variables. `NotFound` if the response has no `variables`.
    async fn read_values(&self, cancel: &CancelToken) -> ArestResult<Map<String, Value>>;

    /// Call an exposed function. `NotFound` if the response has no `return_value`.
    async fn call_function(
        &self,
        cancel: &CancelToken,
        name: &str,
        param: &str,
    ) -> ArestResult<i64>;
}

/// A command line, without its line ending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    Mode { pin: u8, mode: Mode },
    DigitalWrite { pin: u8, level: Level },
    DigitalRead { pin: u8 },
    Variable(&'a str),
    Function { name: &'a str, param: &'a str },
    Index,
}

impl fmt::Display for Command<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mode { pin, mode } => write!(f, "/mode/{pin}/{}", mode.as_wire()),
            Self::DigitalWrite { pin, level } => write!(f, "/digital/{pin}/{}", level.as_wire()),
            Self::DigitalRead { pin } => write!(f, "/digital/{pin}"),
            Self::Variable(name) => write!(f, "/{name}"),
            Self::Function { name, param } => write!(f, "/{name}?params={param}"),
            Self::Index => f.write_str("/"),
        }
    }
}

const RETURN_VALUE: &str = "return_value";
const VARIABLES: &str = "variables";

/// [`Arest`] over any [`Transport`], by default the serial one.
#[derive(Debug)]
pub struct ArestClient<T = SerialTransport> {
    transport: T,
}

impl ArestClient<SerialTransport> {
    /// Open `address` and wrap it in a client.
    pub async fn connect(address: impl Into<String>, config: TransportConfig) -> ArestResult<Self> {
        Ok(Self::new(SerialTransport::open(address, config).await?))
    }

    /// Open the port named in `config` (see [`SerialTransport::from_config`]).
    pub async fn from_config(config: &Config) -> ArestResult<Self> {
        Ok(Self::new(SerialTransport::from_config(config).await?))
    }
}

impl<T: Transport> ArestClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    async fn send(&self, cancel: &CancelToken, command: Command<'_>) -> ArestResult<ResponseFrame> {
        cancel.check()?;
        let line = command.to_string();
        debug!(command = %line, "arest request");
        self.transport.request(cancel, &line).await
    }

    async fn query(
        &self,
        cancel: &CancelToken,
        command: Command<'_>,
    ) -> ArestResult<Map<String, Value>> {
        let frame = self.send(cancel, command).await?;
        decode(&frame)
    }
}

#[async_trait]
impl<T: Transport> Arest for ArestClient<T> {
    async fn set_pin_mode(&self, cancel: &CancelToken, pin: u8, mode: Mode) -> ArestResult<()> {
        self.send(cancel, Command::Mode { pin, mode })
            .await
            .map(|_| ())
    }

    async fn digital_write(&self, cancel: &CancelToken, pin: u8, level: Level) -> ArestResult<()> {
        self.send(cancel, Command::DigitalWrite { pin, level })
            .await
            .map(|_| ())
    }

    async fn digital_read(&self, cancel: &CancelToken, pin: u8) -> ArestResult<Level> {
        let data = self.query(cancel, Command::DigitalRead { pin }).await?;
        let value = require(&data, RETURN_VALUE)?;
        Ok(Level::from_wire(integer(value, RETURN_VALUE)?))
    }

    async fn read_value(&self, cancel: &CancelToken, name: &str) -> ArestResult<Value> {
        let mut data = self.query(cancel, Command::Variable(name)).await?;
        data.remove(name)
            .ok_or_else(|| ArestError::NotFound(name.to_string()))
    }

    async fn read_values(&self, cancel: &CancelToken) -> ArestResult<Map<String, Value>> {
        let mut data = self.query(cancel, Command::Index).await?;
        match data.remove(VARIABLES) {
            Some(Value::Object(variables)) => Ok(variables),
            Some(other) => Err(ArestError::malformed(
                "`variables` is not an object",
                other.to_string(),
            )),
            None => Err(ArestError::NotFound(VARIABLES.to_string())),
        }
    }

    async fn call_function(
        &self,
        cancel: &CancelToken,
        name: &str,
        param: &str,
    ) -> ArestResult<i64> {
        let data = self.query(cancel, Command::Function { name, param }).await?;
        integer(require(&data, RETURN_VALUE)?, RETURN_VALUE)
    }
}

/// Decode a frame into its top-level key/value map.
pub fn decode(frame: &ResponseFrame) -> ArestResult<Map<String, Value>> {
    serde_json::from_slice(frame.as_bytes())
        .map_err(|e| ArestError::malformed(e, frame.text().into_owned()))
}

fn require<'a>(data: &'a Map<String, Value>, key: &str) -> ArestResult<&'a Value> {
    data.get(key)
        .ok_or_else(|| ArestError::NotFound(key.to_string()))
}

/// Integers and floating literals both decode; floats are truncated.
fn integer(value: &Value, key: &str) -> ArestResult<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .ok_or_else(|| ArestError::malformed(format!("`{key}` is not a number"), value.to_string()))
}
