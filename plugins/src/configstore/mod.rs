mod file;

pub use file::FileConfigStore;
