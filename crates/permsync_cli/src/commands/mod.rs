#[cfg(feature = "gitlab")]
pub(crate) mod fetch;
pub(crate) mod run;
pub(crate) mod shared;
