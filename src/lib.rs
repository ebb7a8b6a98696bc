pub mod config;
pub mod decoder;
pub mod demux;
pub mod pipeline;
pub mod recorder;

#[cfg(test)]
mod testutil;
