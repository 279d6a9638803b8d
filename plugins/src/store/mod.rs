mod postgrest;

pub use postgrest::PostgrestTelemetryStore;
