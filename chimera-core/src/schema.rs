//! # Schema Layer
//!
//! Everything that exists before the first byte is decoded: the descriptor
//! model, the registry that binds names, and the flattened interface dispatch
//! tables.
//!
//! A schema is loaded exactly once:
//!
//! ```rust
//! use chimera_core::schema::{EnumDescriptor, MessageDescriptor, SchemaBuilder, TypeDescriptor};
//!
//! # fn load() -> Result<(), chimera_core::schema::SchemaError> {
//! let mut builder = SchemaBuilder::new();
//! builder.register_enum(EnumDescriptor::new("shop.Color", ["red", "green"]))?;
//! builder.register_message(
//!     MessageDescriptor::message("shop.Item")
//!         .field("name", TypeDescriptor::String)
//!         .field("color", TypeDescriptor::Enum("shop.Color".into())),
//! )?;
//! let registry = builder.finish()?;
//! # let _ = registry;
//! # Ok(())
//! # }
//! ```
//!
//! After `finish()` the registry is immutable and freely shared across
//! threads; the codec and the invoker only ever read from it.
pub mod dispatch;
pub mod registry;
pub mod types;

pub use dispatch::{MethodTable, UnknownMethod};
pub use registry::{
    Descriptor, INTERNAL_ERROR_TYPE, ResolvedField, ResolvedInterface, ResolvedMessage,
    SchemaBuilder, SchemaError, TypeRegistry,
};
pub use types::{
    Discriminator, EnumDescriptor, EXCEPTION_CODE_FIELD, FieldDescriptor, InterfaceDescriptor,
    MessageDescriptor, MessageKind, MethodDescriptor, ParamDescriptor, ResultKind, TypeDescriptor,
    TypeName,
};
