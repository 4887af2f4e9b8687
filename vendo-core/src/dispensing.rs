//! Dispensing plan and sequence.
//!
//! A confirmed order expands into one [`DispenseUnit`] per item, in line
//! order then unit-index order. [`DispenseSequence`] walks those units
//! with a single cursor; the async timing lives in
//! [`DispensingRun`](crate::processors::DispensingRun).

use vendo_sdk::objects::ConfirmedLine;

/// One physical dispensing action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispenseUnit {
    pub product_id: i64,
    pub unit_index: u32,
    /// Backend-reported outcome, fixed at creation.
    pub failed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStatus {
    Pending,
    Dispensing,
    Completed,
    Failed,
}

/// Aggregate status of all units of one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductDisplayStatus {
    Pending,
    Dispensing,
    Completed,
    Failed,
    Partial { completed: u32, total: u32 },
}

impl std::fmt::Display for ProductDisplayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => f.write_str("Pending"),
            Self::Dispensing => f.write_str("Dispensing"),
            Self::Completed => f.write_str("Completed"),
            Self::Failed => f.write_str("Failed"),
            Self::Partial { completed, total } => write!(f, "Partial ({completed}/{total})"),
        }
    }
}

/// Project unit statuses onto a single product status.
pub fn product_status(statuses: &[UnitStatus]) -> ProductDisplayStatus {
    let total = statuses.len() as u32;
    let completed = statuses
        .iter()
        .filter(|s| **s == UnitStatus::Completed)
        .count() as u32;
    let failed = statuses
        .iter()
        .filter(|s| **s == UnitStatus::Failed)
        .count() as u32;

    if statuses.contains(&UnitStatus::Dispensing) {
        ProductDisplayStatus::Dispensing
    } else if total > 0 && completed == total {
        ProductDisplayStatus::Completed
    } else if total > 0 && failed == total {
        ProductDisplayStatus::Failed
    } else if total > 0 && completed + failed == total {
        ProductDisplayStatus::Partial { completed, total }
    } else {
        ProductDisplayStatus::Pending
    }
}

/// A usable order line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedLine {
    pub product_id: i64,
    pub name: String,
    pub quantity: u32,
}

/// The fixed dispensing order of a confirmed cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispensePlan {
    lines: Vec<PlannedLine>,
    units: Vec<DispenseUnit>,
}

impl DispensePlan {
    /// Expand confirmed lines into units.
    ///
    /// Lines without an id or with a non-positive quantity are skipped.
    /// Returns `None` when nothing is left to dispense.
    pub fn from_confirmed(lines: &[ConfirmedLine]) -> Option<Self> {
        let mut planned: Vec<PlannedLine> = Vec::new();
        let mut units = Vec::new();
        for (index, line) in lines.iter().enumerate() {
            let (Some(product_id), Some(quantity)) = (line.id, line.quantity) else {
                tracing::warn!(index, "Skipping confirmed line without id or quantity");
                continue;
            };
            let Ok(quantity) = u32::try_from(quantity) else {
                tracing::warn!(index, quantity, "Skipping confirmed line with invalid quantity");
                continue;
            };
            if quantity == 0 {
                tracing::warn!(index, "Skipping confirmed line with zero quantity");
                continue;
            }
            // Repeated product ids merge into one line; unit indices continue.
            let first_index = match planned.iter_mut().find(|p| p.product_id == product_id) {
                Some(existing) => {
                    let first = existing.quantity;
                    existing.quantity += quantity;
                    first
                }
                None => {
                    planned.push(PlannedLine {
                        product_id,
                        name: line.name.clone().unwrap_or_else(|| "Unknown".to_string()),
                        quantity,
                    });
                    0
                }
            };
            units.extend((first_index..first_index + quantity).map(|unit_index| DispenseUnit {
                product_id,
                unit_index,
                failed: line.failed,
            }));
        }
        if units.is_empty() {
            return None;
        }
        Some(Self {
            lines: planned,
            units,
        })
    }

    pub fn lines(&self) -> &[PlannedLine] {
        &self.lines
    }

    pub fn units(&self) -> &[DispenseUnit] {
        &self.units
    }
}

/// Result of one cursor step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The unit at this index started dispensing; hold for the dwell time.
    Dispense(usize),
    /// The unit at this index finished dispensing.
    Resolved(usize),
    /// The unit at this index was failed by the backend and was skipped.
    Skipped(usize),
    /// The cursor passed the last unit. Returned once.
    Completed,
    /// The run already completed; nothing happens.
    Idle,
}

/// Completed/failed tally of a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispenseOutcome {
    pub completed: u32,
    pub failed: u32,
}

/// Status of one product, for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductProgress {
    pub product_id: i64,
    pub name: String,
    pub quantity: u32,
    pub status: ProductDisplayStatus,
}

/// Everything the dispensing screen shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispenseSnapshot {
    pub units: Vec<(DispenseUnit, UnitStatus)>,
    pub products: Vec<ProductProgress>,
    pub cursor: usize,
    pub all_completed: bool,
}

/// Serial walk over a [`DispensePlan`].
#[derive(Debug, Clone)]
pub struct DispenseSequence {
    plan: DispensePlan,
    statuses: Vec<UnitStatus>,
    cursor: usize,
    all_completed: bool,
}

impl DispenseSequence {
    pub fn new(plan: DispensePlan) -> Self {
        let statuses = plan
            .units
            .iter()
            .map(|u| {
                if u.failed {
                    UnitStatus::Failed
                } else {
                    UnitStatus::Pending
                }
            })
            .collect();
        Self {
            plan,
            statuses,
            cursor: 0,
            all_completed: false,
        }
    }

    pub fn statuses(&self) -> &[UnitStatus] {
        &self.statuses
    }

    pub fn all_completed(&self) -> bool {
        self.all_completed
    }

    /// Move the sequence forward by one step.
    pub fn advance(&mut self) -> Step {
        let Some(unit) = self.plan.units.get(self.cursor) else {
            if self.all_completed {
                return Step::Idle;
            }
            self.all_completed = true;
            return Step::Completed;
        };
        let index = self.cursor;
        if unit.failed {
            self.cursor += 1;
            return Step::Skipped(index);
        }
        match self.statuses[index] {
            UnitStatus::Dispensing => {
                self.statuses[index] = UnitStatus::Completed;
                self.cursor += 1;
                Step::Resolved(index)
            }
            _ => {
                self.statuses[index] = UnitStatus::Dispensing;
                Step::Dispense(index)
            }
        }
    }

    pub fn outcome(&self) -> DispenseOutcome {
        let count = |wanted: UnitStatus| {
            self.statuses.iter().filter(|s| **s == wanted).count() as u32
        };
        DispenseOutcome {
            completed: count(UnitStatus::Completed),
            failed: count(UnitStatus::Failed),
        }
    }

    pub fn snapshot(&self) -> DispenseSnapshot {
        let products = self
            .plan
            .lines
            .iter()
            .map(|line| {
                let statuses: Vec<UnitStatus> = self
                    .plan
                    .units
                    .iter()
                    .zip(&self.statuses)
                    .filter(|(u, _)| u.product_id == line.product_id)
                    .map(|(_, s)| *s)
                    .collect();
                ProductProgress {
                    product_id: line.product_id,
                    name: line.name.clone(),
                    quantity: line.quantity,
                    status: product_status(&statuses),
                }
            })
            .collect();
        DispenseSnapshot {
            units: self
                .plan
                .units
                .iter()
                .copied()
                .zip(self.statuses.iter().copied())
                .collect(),
            products,
            cursor: self.cursor,
            all_completed: self.all_completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confirmed(id: i64, quantity: i64, failed: bool) -> ConfirmedLine {
        ConfirmedLine {
            id: Some(id),
            name: Some(format!("product-{id}")),
            quantity: Some(quantity),
            failed,
            ..Default::default()
        }
    }

    #[test]
    fn test_expansion_order() {
        let plan =
            DispensePlan::from_confirmed(&[confirmed(7, 2, false), confirmed(3, 1, true)]).unwrap();
        let order: Vec<(i64, u32, bool)> = plan
            .units()
            .iter()
            .map(|u| (u.product_id, u.unit_index, u.failed))
            .collect();
        assert_eq!(order, vec![(7, 0, false), (7, 1, false), (3, 0, true)]);
    }

    #[test]
    fn test_unusable_lines_are_dropped() {
        let lines = vec![
            ConfirmedLine::default(),
            confirmed(1, 0, false),
            confirmed(2, -3, false),
        ];
        assert_eq!(DispensePlan::from_confirmed(&lines), None);
        assert_eq!(DispensePlan::from_confirmed(&[]), None);

        let plan = DispensePlan::from_confirmed(&[ConfirmedLine::default(), confirmed(4, 1, false)])
            .unwrap();
        assert_eq!(plan.units().len(), 1);
        assert_eq!(plan.lines()[0].product_id, 4);
    }

    #[test]
    fn test_sequence_is_serial_and_skips_failed() {
        let plan =
            DispensePlan::from_confirmed(&[confirmed(1, 2, false), confirmed(2, 1, true)]).unwrap();
        let mut seq = DispenseSequence::new(plan);
        assert_eq!(seq.statuses()[2], UnitStatus::Failed);

        let mut steps = Vec::new();
        loop {
            let step = seq.advance();
            let dispensing = seq
                .statuses()
                .iter()
                .filter(|s| **s == UnitStatus::Dispensing)
                .count();
            assert!(dispensing <= 1);
            steps.push(step);
            if step == Step::Completed {
                break;
            }
        }
        assert_eq!(
            steps,
            vec![
                Step::Dispense(0),
                Step::Resolved(0),
                Step::Dispense(1),
                Step::Resolved(1),
                Step::Skipped(2),
                Step::Completed,
            ]
        );
        assert!(seq.all_completed());
        assert_eq!(
            seq.outcome(),
            DispenseOutcome {
                completed: 2,
                failed: 1
            }
        );
    }

    #[test]
    fn test_completion_reported_once() {
        let plan = DispensePlan::from_confirmed(&[confirmed(1, 1, true)]).unwrap();
        let mut seq = DispenseSequence::new(plan);
        assert_eq!(seq.advance(), Step::Skipped(0));
        assert_eq!(seq.advance(), Step::Completed);
        assert_eq!(seq.advance(), Step::Idle);
        assert_eq!(seq.advance(), Step::Idle);
    }

    #[test]
    fn test_product_status_projection() {
        use UnitStatus::*;
        assert_eq!(product_status(&[Pending, Pending]), ProductDisplayStatus::Pending);
        assert_eq!(product_status(&[Completed, Dispensing]), ProductDisplayStatus::Dispensing);
        assert_eq!(product_status(&[Completed, Completed]), ProductDisplayStatus::Completed);
        assert_eq!(product_status(&[Failed, Failed]), ProductDisplayStatus::Failed);
        assert_eq!(
            product_status(&[Completed, Failed, Completed]),
            ProductDisplayStatus::Partial {
                completed: 2,
                total: 3
            }
        );
        assert_eq!(product_status(&[Completed, Pending]), ProductDisplayStatus::Pending);
        assert_eq!(product_status(&[]), ProductDisplayStatus::Pending);
    }

    #[test]
    fn test_snapshot_groups_by_product() {
        let plan =
            DispensePlan::from_confirmed(&[confirmed(1, 2, false), confirmed(2, 1, false)]).unwrap();
        let mut seq = DispenseSequence::new(plan);
        seq.advance();
        let snapshot = seq.snapshot();
        assert_eq!(snapshot.units.len(), 3);
        assert_eq!(snapshot.products[0].status, ProductDisplayStatus::Dispensing);
        assert_eq!(snapshot.products[1].status, ProductDisplayStatus::Pending);
        assert!(!snapshot.all_completed);
    }

    #[test]
    fn test_repeated_product_merges_into_one_line() {
        let plan =
            DispensePlan::from_confirmed(&[confirmed(5, 1, false), confirmed(5, 2, true)]).unwrap();
        assert_eq!(plan.lines().len(), 1);
        assert_eq!(plan.lines()[0].quantity, 3);
        let indices: Vec<u32> = plan.units().iter().map(|u| u.unit_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }
}
