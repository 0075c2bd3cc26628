//! Position derivation over lane snapshots.
//!
//! Pure functions: the engine takes a snapshot of a lane before and after
//! a mutation and feeds the diff into per-ticket position updates, so
//! dashboards never display a stale rank.

/// A ticket whose 1-based rank changed between two snapshots of a lane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionShift {
    pub ticket_id: String,
    pub position: usize,
}

/// 1-based position of a ticket within an ordered snapshot.
pub fn position_in(snapshot: &[String], ticket_id: &str) -> Option<usize> {
    snapshot.iter().position(|id| id == ticket_id).map(|i| i + 1)
}

/// Tickets present in `after` whose rank differs from their rank in
/// `before` (including tickets absent from `before`).
pub fn shifted(before: &[String], after: &[String]) -> Vec<PositionShift> {
    after
        .iter()
        .enumerate()
        .filter_map(|(idx, id)| {
            let position = idx + 1;
            match position_in(before, id) {
                Some(old) if old == position => None,
                _ => Some(PositionShift {
                    ticket_id: id.clone(),
                    position,
                }),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_position_in_snapshot() {
        let snap = ids(&["a", "b", "c"]);
        assert_eq!(position_in(&snap, "a"), Some(1));
        assert_eq!(position_in(&snap, "c"), Some(3));
        assert_eq!(position_in(&snap, "zz"), None);
    }

    #[test]
    fn test_no_shift_when_nothing_changed() {
        let snap = ids(&["a", "b"]);
        assert!(shifted(&snap, &snap).is_empty());
    }

    #[test]
    fn test_head_insert_shifts_everyone_down() {
        let before = ids(&["a", "b"]);
        let after = ids(&["urgent", "a", "b"]);
        let shifts = shifted(&before, &after);
        assert_eq!(
            shifts,
            vec![
                PositionShift {
                    ticket_id: "urgent".to_string(),
                    position: 1
                },
                PositionShift {
                    ticket_id: "a".to_string(),
                    position: 2
                },
                PositionShift {
                    ticket_id: "b".to_string(),
                    position: 3
                },
            ]
        );
    }

    #[test]
    fn test_tail_insert_shifts_only_itself() {
        let before = ids(&["a", "b"]);
        let after = ids(&["a", "b", "c"]);
        let shifts = shifted(&before, &after);
        assert_eq!(shifts.len(), 1);
        assert_eq!(shifts[0].ticket_id, "c");
        assert_eq!(shifts[0].position, 3);
    }

    #[test]
    fn test_head_removal_shifts_rest_up() {
        let before = ids(&["a", "b", "c"]);
        let after = ids(&["b", "c"]);
        let shifts = shifted(&before, &after);
        assert_eq!(
            shifts,
            vec![
                PositionShift {
                    ticket_id: "b".to_string(),
                    position: 1
                },
                PositionShift {
                    ticket_id: "c".to_string(),
                    position: 2
                },
            ]
        );
    }

    #[test]
    fn test_tail_removal_shifts_nothing() {
        let before = ids(&["a", "b", "c"]);
        let after = ids(&["a", "b"]);
        assert!(shifted(&before, &after).is_empty());
    }
}
