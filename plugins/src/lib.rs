//! Concrete collaborator implementations for the FairPrice core: the
//! PostgREST telemetry store, the file-backed tunnel-config inventory, and
//! the HTTP short-URL resolver. Extraction and the tunnel backend are
//! platform services the host wires in itself.

pub mod configstore;
pub mod factory;
pub mod store;
pub mod urlresolve;
