use thiserror::Error;

use crate::Channel;

#[derive(Debug, Error)]
pub enum EnergyError {
    #[error("Counter unavailable for {channel} energy: {source}")]
    CounterUnavailable {
        channel: Channel,
        #[source]
        source: std::io::Error,
    },

    #[error("Energy meter is {state}, expected {expected}")]
    InvalidState {
        state: &'static str,
        expected: &'static str,
    },
}
