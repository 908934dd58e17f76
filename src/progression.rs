//! Progression orders and the packet iteration sequences they define.
//!
//! The core emits LRCP and dispatches all five orders on decode. With one
//! precinct per resolution the position dimension collapses, so every
//! order reduces to a permutation of (layer, resolution, component).

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Progression order as signalled in COD (Table A.16).
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ProgressionOrder {
    /// Layer - resolution - component - position.
    Lrcp = 0,
    /// Resolution - layer - component - position.
    Rlcp = 1,
    /// Resolution - position - component - layer.
    Rpcl = 2,
    /// Position - component - resolution - layer.
    Pcrl = 3,
    /// Component - position - resolution - layer.
    Cprl = 4,
}

/// One packet slot in the progression sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressionStep {
    pub layer: u16,
    pub resolution: u8,
    pub component: u16,
    pub precinct: u32,
}

/// Build the full packet sequence for a tile with one precinct per
/// resolution. The sequence length is `layers * resolutions * components`.
pub fn packet_sequence(
    order: ProgressionOrder,
    layers: u16,
    resolutions: u8,
    components: u16,
) -> Vec<ProgressionStep> {
    let mut steps =
        Vec::with_capacity(layers as usize * resolutions as usize * components as usize);
    let mut push = |layer, resolution, component| {
        steps.push(ProgressionStep {
            layer,
            resolution,
            component,
            precinct: 0,
        })
    };

    match order {
        ProgressionOrder::Lrcp => {
            for l in 0..layers {
                for r in 0..resolutions {
                    for c in 0..components {
                        push(l, r, c);
                    }
                }
            }
        }
        ProgressionOrder::Rlcp => {
            for r in 0..resolutions {
                for l in 0..layers {
                    for c in 0..components {
                        push(l, r, c);
                    }
                }
            }
        }
        ProgressionOrder::Rpcl => {
            for r in 0..resolutions {
                for c in 0..components {
                    for l in 0..layers {
                        push(l, r, c);
                    }
                }
            }
        }
        ProgressionOrder::Pcrl | ProgressionOrder::Cprl => {
            for c in 0..components {
                for r in 0..resolutions {
                    for l in 0..layers {
                        push(l, r, c);
                    }
                }
            }
        }
    }

    steps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lrcp_iterates_components_innermost() {
        let steps = packet_sequence(ProgressionOrder::Lrcp, 1, 2, 3);
        assert_eq!(steps.len(), 6);
        assert_eq!(
            steps
                .iter()
                .map(|s| (s.resolution, s.component))
                .collect::<Vec<_>>(),
            vec![(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (1, 2)]
        );
    }

    #[test]
    fn rlcp_iterates_resolution_outermost() {
        let steps = packet_sequence(ProgressionOrder::Rlcp, 2, 2, 1);
        assert_eq!(
            steps
                .iter()
                .map(|s| (s.resolution, s.layer))
                .collect::<Vec<_>>(),
            vec![(0, 0), (0, 1), (1, 0), (1, 1)]
        );
    }

    #[test]
    fn all_orders_cover_every_packet() {
        for order in [
            ProgressionOrder::Lrcp,
            ProgressionOrder::Rlcp,
            ProgressionOrder::Rpcl,
            ProgressionOrder::Pcrl,
            ProgressionOrder::Cprl,
        ] {
            let steps = packet_sequence(order, 2, 3, 4);
            assert_eq!(steps.len(), 24);
            let mut seen = steps
                .iter()
                .map(|s| (s.layer, s.resolution, s.component))
                .collect::<Vec<_>>();
            seen.sort_unstable();
            seen.dedup();
            assert_eq!(seen.len(), 24);
        }
    }

    #[test]
    fn order_codes_match_cod_values() {
        assert_eq!(ProgressionOrder::try_from(0u8).unwrap(), ProgressionOrder::Lrcp);
        assert_eq!(ProgressionOrder::try_from(4u8).unwrap(), ProgressionOrder::Cprl);
        assert!(ProgressionOrder::try_from(5u8).is_err());
    }
}
