mod config;
mod error;

#[cfg(test)]
mod test;

pub use config::Config;
pub use error::{
    config_err, contract_err, corrupt_err, err, schema_err, version_err, Error, ErrorKind, Result,
};
