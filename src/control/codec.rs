use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::control::{
    ControlMessage, DrainMessage, EndOfStreamMessage, MessageType, WatermarkMessage,
};
use crate::error::{Error, Result};

/// Byte codec for one payload type.
pub trait Serde<T> {
    fn to_bytes(&self, value: &T) -> Result<Vec<u8>>;
    fn from_bytes(&self, bytes: &[u8]) -> Result<T>;
}

/// Passes bytes through untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytesSerde;

impl Serde<Vec<u8>> for BytesSerde {
    fn to_bytes(&self, value: &Vec<u8>) -> Result<Vec<u8>> {
        Ok(value.clone())
    }

    fn from_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

/// UTF-8 strings.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringSerde;

impl Serde<String> for StringSerde {
    fn to_bytes(&self, value: &String) -> Result<Vec<u8>> {
        Ok(value.as_bytes().to_vec())
    }

    fn from_bytes(&self, bytes: &[u8]) -> Result<String> {
        String::from_utf8(bytes.to_vec()).map_err(|err| Error::Serialization(err.to_string()))
    }
}

/// JSON via serde.
pub struct JsonSerde<T>(PhantomData<fn() -> T>);

impl<T> JsonSerde<T> {
    pub fn new() -> Self {
        JsonSerde(PhantomData)
    }
}

impl<T> Default for JsonSerde<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonSerde<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for JsonSerde<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JsonSerde")
    }
}

impl<T: Serialize + DeserializeOwned> Serde<T> for JsonSerde<T> {
    fn to_bytes(&self, value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn from_bytes(&self, bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Frames user records and control messages for one intermediate stream.
///
/// User payloads go through the injected serde `S`; control payloads are
/// always JSON.
#[derive(Debug, Clone)]
pub struct IntermediateMessageCodec<S> {
    user: S,
    watermark: JsonSerde<WatermarkMessage>,
    end_of_stream: JsonSerde<EndOfStreamMessage>,
    drain: JsonSerde<DrainMessage>,
}

impl<S> IntermediateMessageCodec<S> {
    pub fn new(user: S) -> Self {
        IntermediateMessageCodec {
            user,
            watermark: JsonSerde::new(),
            end_of_stream: JsonSerde::new(),
            drain: JsonSerde::new(),
        }
    }

    /// `[tag][payload]`.
    pub fn encode<T>(&self, message: &ControlMessage<T>) -> Result<Vec<u8>>
    where
        S: Serde<T>,
    {
        let payload = match message {
            ControlMessage::User(value) => self.user.to_bytes(value)?,
            ControlMessage::Watermark(m) => self.watermark.to_bytes(m)?,
            ControlMessage::EndOfStream(m) => self.end_of_stream.to_bytes(m)?,
            ControlMessage::Drain(m) => self.drain.to_bytes(m)?,
        };
        let mut bytes = Vec::with_capacity(payload.len() + 1);
        bytes.push(message.message_type().tag());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    pub fn decode<T>(&self, bytes: &[u8]) -> Result<ControlMessage<T>>
    where
        S: Serde<T>,
    {
        // Streams written before the tag byte existed have no type to read.
        let Some((&tag, payload)) = bytes.split_first() else {
            return Err(Error::LegacyFormat);
        };
        let message_type = MessageType::from_tag(tag).ok_or(Error::UnsupportedMessageType(tag))?;
        Ok(match message_type {
            MessageType::UserMessage => ControlMessage::User(self.user.from_bytes(payload)?),
            MessageType::Watermark => ControlMessage::Watermark(self.watermark.from_bytes(payload)?),
            MessageType::EndOfStream => {
                ControlMessage::EndOfStream(self.end_of_stream.from_bytes(payload)?)
            }
            MessageType::Drain => ControlMessage::Drain(self.drain.from_bytes(payload)?),
        })
    }

    pub fn user_serde(&self) -> &S {
        &self.user
    }
}
