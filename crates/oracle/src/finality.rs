//! # Consensus Finality Gate
//!
//! Maps an execution-layer block time onto the consensus timeline and
//! refuses checkpoints whose epoch is not finalized yet.
//!
//! ```text
//! slot  = (block_time - genesis_time) / seconds_per_slot   (0 before genesis)
//! epoch = slot / slots_per_epoch
//! ```

use watchtower_common::{BeaconChainConfig, BeaconHead};

/// Consensus position of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsensusPosition {
    pub slot: u64,
    pub epoch: u64,
}

/// Gate decision for a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalityStatus {
    Finalized(ConsensusPosition),
    /// Checkpoint epoch is ahead of the latest finalized epoch.
    Pending {
        position: ConsensusPosition,
        finalized_epoch: u64,
    },
}

/// Slot and epoch containing `block_time`.
///
/// Zero timing parameters map to slot/epoch 0 instead of dividing by zero.
pub fn position_of(block_time: u64, config: &BeaconChainConfig) -> ConsensusPosition {
    let elapsed = block_time.saturating_sub(config.genesis_time);
    let slot = elapsed.checked_div(config.seconds_per_slot).unwrap_or(0);
    let epoch = slot.checked_div(config.slots_per_epoch).unwrap_or(0);
    ConsensusPosition { slot, epoch }
}

/// Evaluates the finality gate for a block at `block_time`.
pub fn check_finality(
    block_time: u64,
    config: &BeaconChainConfig,
    head: &BeaconHead,
) -> FinalityStatus {
    let position = position_of(block_time, config);
    if position.epoch > head.finalized_epoch {
        FinalityStatus::Pending {
            position,
            finalized_epoch: head.finalized_epoch,
        }
    } else {
        FinalityStatus::Finalized(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: BeaconChainConfig = BeaconChainConfig {
        genesis_time: 1_000,
        seconds_per_slot: 12,
        slots_per_epoch: 32,
    };

    fn head(finalized_epoch: u64) -> BeaconHead {
        BeaconHead {
            epoch: finalized_epoch + 2,
            finalized_epoch,
        }
    }

    #[test]
    fn slot_and_epoch_from_block_time() {
        let p = position_of(1_000 + 12 * 32 * 11 + 25, &CONFIG);
        assert_eq!(p.slot, 32 * 11 + 2);
        assert_eq!(p.epoch, 11);
    }

    #[test]
    fn block_time_before_genesis_is_slot_zero() {
        assert_eq!(position_of(10, &CONFIG), ConsensusPosition { slot: 0, epoch: 0 });
    }

    #[test]
    fn epoch_ahead_of_finalized_is_pending() {
        let block_time = 1_000 + 12 * 32 * 11;
        assert_eq!(
            check_finality(block_time, &CONFIG, &head(10)),
            FinalityStatus::Pending {
                position: ConsensusPosition {
                    slot: 32 * 11,
                    epoch: 11
                },
                finalized_epoch: 10
            }
        );
    }

    #[test]
    fn epoch_at_finalized_passes() {
        let block_time = 1_000 + 12 * 32 * 10 + 12 * 31;
        assert!(matches!(
            check_finality(block_time, &CONFIG, &head(10)),
            FinalityStatus::Finalized(ConsensusPosition { epoch: 10, .. })
        ));
    }
}
