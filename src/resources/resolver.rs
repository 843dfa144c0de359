//! Best-match selection over configuration-qualified resource variants.
//!
//! Selection policy, in tiers: among density-qualified variants prefer the
//! smallest density at or above the request ("round up"), else the largest
//! below it ("round down"); the unqualified default variant is always a
//! valid fallback below any density-qualified candidate. Equal distance is
//! broken by qualifier specificity, then by declaration order, making the
//! selection total and deterministic.
//!
//! Reference-typed values are followed iteratively with an explicit depth
//! counter so a cyclic table can never loop the resolver.

use crate::binary_xml::TYPE_REFERENCE;
use crate::resources::config::Configuration;
use crate::resources::table::{ResValue, ResourceTable, TableEntry};
use crate::resources::ResourceId;
use crate::types::{ApkError, ApkResult};
use log::debug;

/// Maximum reference indirection depth before resolution fails with a
/// cycle error.
pub const MAX_REFERENCE_DEPTH: usize = 10;

/// Resolve a resource id against the table for a requested configuration,
/// following reference values up to [`MAX_REFERENCE_DEPTH`] steps.
pub fn resolve(
    table: &ResourceTable,
    id: ResourceId,
    requested: &Configuration,
) -> ApkResult<ResValue> {
    let mut current = id;
    for _ in 0..MAX_REFERENCE_DEPTH {
        let variants = table
            .variants(current)
            .ok_or(ApkError::NotFound(current.raw()))?;
        let value =
            select_best(variants, requested).ok_or(ApkError::NotFound(current.raw()))?;
        if value.data_type == TYPE_REFERENCE {
            debug!("following resource reference {current} -> 0x{:08x}", value.data);
            current = ResourceId::new(value.data);
            continue;
        }
        return Ok(value);
    }
    Err(ApkError::ResourceCycle(id.raw()))
}

/// Matching tier and distance for one candidate density against a request.
/// Lower tier wins; within a tier, lower distance wins.
fn rank(config: &Configuration, requested: &Configuration) -> (u8, u32) {
    let d = u32::from(config.density);
    let r = u32::from(requested.density);
    if d == 0 {
        // Unqualified fallback.
        (2, 0)
    } else if r == 0 {
        // Caller asked for the default: any density is a distant second.
        (1, d)
    } else if d >= r {
        (0, d - r)
    } else {
        (1, r - d)
    }
}

/// Pick the best simple entry among a variant list. Complex (map) entries
/// are not candidates. Returns `None` when nothing is selectable.
fn select_best(
    variants: &[(Configuration, TableEntry)],
    requested: &Configuration,
) -> Option<ResValue> {
    let mut best: Option<((u8, u32), u32, ResValue)> = None;
    for (config, entry) in variants {
        let value = match entry.simple_value() {
            Some(value) => value,
            None => continue,
        };
        let candidate = (rank(config, requested), config.specificity(), value);
        best = match best {
            None => Some(candidate),
            Some(current) => {
                let (cur_rank, cur_spec, _) = current;
                let (cand_rank, cand_spec, _) = candidate;
                // Strict improvement only: first-declared wins all remaining ties.
                if cand_rank < cur_rank || (cand_rank == cur_rank && cand_spec > cur_spec) {
                    Some(candidate)
                } else {
                    Some(current)
                }
            }
        };
    }
    best.map(|(_, _, value)| value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary_xml::{TYPE_INT_DEC, TYPE_STRING};

    fn simple(density: u16, data: u32) -> (Configuration, TableEntry) {
        (
            Configuration::with_density(density),
            TableEntry::Simple {
                key: 0,
                value: ResValue {
                    data_type: TYPE_INT_DEC,
                    data,
                },
            },
        )
    }

    fn reference(target: u32) -> (Configuration, TableEntry) {
        (
            Configuration::default(),
            TableEntry::Simple {
                key: 0,
                value: ResValue {
                    data_type: TYPE_REFERENCE,
                    data: target,
                },
            },
        )
    }

    fn table_with(variants: Vec<(u32, Vec<(Configuration, TableEntry)>)>) -> ResourceTable {
        ResourceTable::from_variants(variants)
    }

    #[test]
    fn prefers_smallest_density_at_or_above_request() {
        let variants = vec![simple(0, 1), simple(160, 2), simple(480, 3), simple(640, 4)];
        let value = select_best(&variants, &Configuration::with_density(320)).unwrap();
        assert_eq!(value.data, 3);
    }

    #[test]
    fn rounds_down_when_nothing_above_request() {
        let variants = vec![simple(0, 1), simple(160, 2), simple(240, 3)];
        let value = select_best(&variants, &Configuration::with_density(480)).unwrap();
        assert_eq!(value.data, 3);
    }

    #[test]
    fn default_variant_is_the_last_resort() {
        let variants = vec![simple(0, 1), simple(160, 2)];
        let value = select_best(&variants, &Configuration::with_density(480)).unwrap();
        assert_eq!(value.data, 2);

        let only_default = vec![simple(0, 7)];
        let value = select_best(&only_default, &Configuration::with_density(480)).unwrap();
        assert_eq!(value.data, 7);
    }

    #[test]
    fn equal_distance_breaks_on_specificity_then_order() {
        let more_specific = (
            Configuration {
                density: 320,
                language: *b"en",
                ..Configuration::default()
            },
            TableEntry::Simple {
                key: 0,
                value: ResValue {
                    data_type: TYPE_INT_DEC,
                    data: 9,
                },
            },
        );
        let mut variants = vec![simple(320, 1), more_specific.clone()];
        let value = select_best(&variants, &Configuration::with_density(320)).unwrap();
        assert_eq!(value.data, 9);

        // Re-ordering equally ranked candidates never changes the outcome.
        variants.reverse();
        let value = select_best(&variants, &Configuration::with_density(320)).unwrap();
        assert_eq!(value.data, 9);
    }

    #[test]
    fn follows_references_to_a_literal() {
        let table = table_with(vec![
            (0x7F01_0000, vec![reference(0x7F01_0001)]),
            (
                0x7F01_0001,
                vec![(
                    Configuration::default(),
                    TableEntry::Simple {
                        key: 0,
                        value: ResValue {
                            data_type: TYPE_STRING,
                            data: 5,
                        },
                    },
                )],
            ),
        ]);
        let value = resolve(
            &table,
            ResourceId::new(0x7F01_0000),
            &Configuration::with_density(320),
        )
        .unwrap();
        assert_eq!(value.data_type, TYPE_STRING);
        assert_eq!(value.data, 5);
    }

    #[test]
    fn self_reference_yields_cycle_error_not_a_loop() {
        let table = table_with(vec![(0x7F01_0000, vec![reference(0x7F01_0000)])]);
        match resolve(
            &table,
            ResourceId::new(0x7F01_0000),
            &Configuration::default(),
        ) {
            Err(ApkError::ResourceCycle(id)) => assert_eq!(id, 0x7F01_0000),
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn missing_id_reports_not_found() {
        let table = table_with(vec![]);
        match resolve(
            &table,
            ResourceId::new(0x7F09_0001),
            &Configuration::default(),
        ) {
            Err(ApkError::NotFound(id)) => assert_eq!(id, 0x7F09_0001),
            other => panic!("expected not-found, got {other:?}"),
        }
    }

    #[test]
    fn dangling_reference_reports_not_found() {
        let table = table_with(vec![(0x7F01_0000, vec![reference(0x0105_0001)])]);
        match resolve(
            &table,
            ResourceId::new(0x7F01_0000),
            &Configuration::default(),
        ) {
            Err(ApkError::NotFound(id)) => assert_eq!(id, 0x0105_0001),
            other => panic!("expected not-found, got {other:?}"),
        }
    }
}
