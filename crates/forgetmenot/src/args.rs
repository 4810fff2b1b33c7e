//! Argument encoding for cache keys
//!
//! Every argument is converted to a `serde_json::Value` and the list is
//! written in a canonical form: objects have their keys sorted, sequences
//! keep their order. `None` encodes as `null`, `""` as `""`, and a missing
//! argument simply shortens the list, so the three never collide.

use std::any::Any;
use std::fmt::Write as _;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Ordered, encoded argument values of one call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodedArgs(Vec<Value>);

impl EncodedArgs {
    /// Wrap already encoded values
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Number of arguments
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the call had no arguments
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw encoded values
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// Decode the argument at `index`, `Ok(None)` if it was not supplied
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<Option<T>> {
        match self.0.get(index) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Canonical text used as the argument segment of a key
    pub fn to_key_segment(&self) -> String {
        let mut out = String::new();
        write_canonical(&Value::Array(self.0.clone()), &mut out);
        out
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{}:", Value::String(key.clone()));
                write_canonical(item, out);
            }
            out.push('}');
        }
        scalar => {
            let _ = write!(out, "{}", scalar);
        }
    }
}

/// Argument tuples accepted by cached and memoized members
///
/// Implemented for `()` and tuples of up to eight `Serialize` values.
pub trait CallArgs {
    /// Number of parameters the member takes
    const ARITY: usize;

    /// Encode every argument in order
    fn encode(&self) -> Result<EncodedArgs>;
}

impl CallArgs for () {
    const ARITY: usize = 0;

    fn encode(&self) -> Result<EncodedArgs> {
        Ok(EncodedArgs::default())
    }
}

macro_rules! impl_call_args {
    ($arity:expr; $($name:ident),+) => {
        impl<$($name: Serialize),+> CallArgs for ($($name,)+) {
            const ARITY: usize = $arity;

            #[allow(non_snake_case)]
            fn encode(&self) -> Result<EncodedArgs> {
                let ($($name,)+) = self;
                Ok(EncodedArgs(vec![$(serde_json::to_value($name)?),+]))
            }
        }
    };
}

impl_call_args!(1; A);
impl_call_args!(2; A, B);
impl_call_args!(3; A, B, C);
impl_call_args!(4; A, B, C, D);
impl_call_args!(5; A, B, C, D, E);
impl_call_args!(6; A, B, C, D, E, F);
impl_call_args!(7; A, B, C, D, E, F, G);
impl_call_args!(8; A, B, C, D, E, F, G, H);

/// A continuation attached to a call
pub type Block = Box<dyn Any + Send>;

/// One invocation of a wrapped member: its arguments and an optional block
///
/// Wrapped members never accept a block; it exists so callers that forward
/// arbitrary invocations get an explicit error instead of a silently ignored
/// continuation.
pub struct Invocation<A> {
    args: A,
    block: Option<Block>,
}

impl<A> Invocation<A> {
    /// Invocation without a block
    pub fn new(args: A) -> Self {
        Self { args, block: None }
    }

    /// Attach a continuation
    pub fn with_block<F: Send + 'static>(mut self, block: F) -> Self {
        self.block = Some(Box::new(block));
        self
    }

    /// True if a continuation is attached
    pub fn has_block(&self) -> bool {
        self.block.is_some()
    }

    /// Reject attached blocks and hand back the arguments
    pub(crate) fn into_args(self, kind: &str) -> Result<A> {
        if self.block.is_some() {
            return Err(Error::InvalidUsage(format!(
                "Cannot pass blocks to {} methods",
                kind
            )));
        }
        Ok(self.args)
    }
}

impl<A> From<A> for Invocation<A> {
    fn from(args: A) -> Self {
        Invocation::new(args)
    }
}
