//! Object model - a replicated map of string properties
//!
//! Wire format of a mutation:
//! - tag (1 byte): 0x01 set, 0x02 delete
//! - key length (u16, big endian) + key bytes
//! - set only: value length (u32, big endian) + value bytes

use std::collections::BTreeMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use weft_core::{WeftError, WeftResult};

use crate::{Model, ModelMeta, MutationCodec, MutationMeta, StateReducer};

const TAG_SET: u8 = 0x01;
const TAG_DELETE: u8 = 0x02;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectMutation {
    Set { key: String, value: String },
    Delete { key: String },
}

impl MutationCodec for ObjectMutation {
    fn encode(&self) -> WeftResult<Bytes> {
        let mut buf = BytesMut::new();
        match self {
            ObjectMutation::Set { key, value } => {
                buf.put_u8(TAG_SET);
                buf.put_u16(length_prefix("key", key)?);
                buf.put_slice(key.as_bytes());
                buf.put_u32(length_prefix("value", value)?);
                buf.put_slice(value.as_bytes());
            }
            ObjectMutation::Delete { key } => {
                buf.put_u8(TAG_DELETE);
                buf.put_u16(length_prefix("key", key)?);
                buf.put_slice(key.as_bytes());
            }
        }
        Ok(buf.freeze())
    }

    fn decode(mut buf: &[u8]) -> WeftResult<Self> {
        if buf.remaining() < 3 {
            return Err(WeftError::BufferTooShort {
                expected: 3,
                actual: buf.remaining(),
            });
        }
        let tag = buf.get_u8();
        let key_len = buf.get_u16() as usize;
        let key = take_string(&mut buf, key_len)?;

        let mutation = match tag {
            TAG_SET => {
                if buf.remaining() < 4 {
                    return Err(WeftError::BufferTooShort {
                        expected: 4,
                        actual: buf.remaining(),
                    });
                }
                let value_len = buf.get_u32() as usize;
                let value = take_string(&mut buf, value_len)?;
                ObjectMutation::Set { key, value }
            }
            TAG_DELETE => ObjectMutation::Delete { key },
            other => {
                return Err(WeftError::InvalidMutation(format!(
                    "unknown object mutation tag {other:#04x}"
                )))
            }
        };

        if buf.has_remaining() {
            return Err(WeftError::InvalidMutation("trailing bytes".into()));
        }
        Ok(mutation)
    }
}

fn length_prefix<T: TryFrom<usize>>(field: &str, s: &str) -> WeftResult<T> {
    T::try_from(s.len()).map_err(|_| {
        WeftError::InvalidMutation(format!("{field} of {} bytes is too long", s.len()))
    })
}

fn take_string(buf: &mut &[u8], len: usize) -> WeftResult<String> {
    if buf.remaining() < len {
        return Err(WeftError::BufferTooShort {
            expected: len,
            actual: buf.remaining(),
        });
    }
    let bytes = buf.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec()).map_err(|e| WeftError::InvalidMutation(e.to_string()))
}

/// Last-writer-wins property map. Order is the replication order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectModel {
    properties: BTreeMap<String, String>,
}

impl ObjectModel {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }
}

impl StateReducer for ObjectModel {
    type Mutation = ObjectMutation;

    const META: ModelMeta = ModelMeta {
        type_id: "weft:model/object",
        mutation_type_id: "weft:model/object/mutation",
    };

    fn apply(&mut self, _meta: &MutationMeta, mutation: &ObjectMutation) -> WeftResult<bool> {
        Ok(match mutation {
            ObjectMutation::Set { key, value } => {
                if self.properties.get(key) == Some(value) {
                    false
                } else {
                    self.properties.insert(key.clone(), value.clone());
                    true
                }
            }
            ObjectMutation::Delete { key } => self.properties.remove(key).is_some(),
        })
    }
}

impl Model<ObjectModel> {
    pub fn property(&self, key: &str) -> Option<String> {
        self.read(|state| state.get(key).map(str::to_string))
    }

    pub async fn set_property(&self, key: impl Into<String>, value: impl Into<String>) -> WeftResult<()> {
        self.write(ObjectMutation::Set {
            key: key.into(),
            value: value.into(),
        })
        .await
    }

    pub async fn delete_property(&self, key: impl Into<String>) -> WeftResult<()> {
        self.write(ObjectMutation::Delete { key: key.into() }).await
    }
}
