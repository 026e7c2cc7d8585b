//! # Chimera Core
//!
//! `chimera_core` is the runtime a schema-driven code generator targets: a
//! type-descriptor registry, a discriminator-based polymorphic codec, and an
//! interface-dispatch/streaming-invocation engine. It consumes an
//! already-parsed schema and already-framed field streams; the IDL parser,
//! the source emitter and the byte transport are external collaborators.
//!
//! ## Key Components
//!
//! * **[`schema`]:** Immutable type descriptors, the [`schema::TypeRegistry`]
//!   built once through a [`schema::SchemaBuilder`], and the flattened
//!   interface [`schema::MethodTable`]s.
//! * **[`value`]:** The in-memory representation of a typed value, shared by
//!   the codec and the invoker.
//! * **[`codec`]:** Encodes and decodes values against an abstract field
//!   stream, resolving concrete message subtypes through discriminator
//!   fields; ships a JSON adaptor for framing layers that speak JSON.
//! * **[`invoke`]:** Executes calls against an injected handler, producing a
//!   single value or a cancellable stream of values with typed error
//!   propagation.
//!
//! ## Concurrency
//!
//! The registry is finalized single-threaded and read-only afterwards; share
//! it behind an `Arc`. Each call owns its argument and result values, and
//! stream production runs on its own task, so concurrent calls never contend.
pub mod codec;
pub mod invoke;
pub mod schema;
pub mod value;

/// Type alias for the standard boxed error used in generic bounds.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
