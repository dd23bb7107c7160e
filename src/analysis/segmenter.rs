use itertools::Itertools;
use serde::Serialize;

use crate::laps::{Compound, Lap};

/// A maximal run of consecutive laps on one compound.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Stint {
    /// 1-based, in detection order
    pub stint_number: u32,
    pub compound: Compound,
    pub start_lap: u32,
    pub end_lap: u32,
    pub tyre_age_start: u32,
    pub laps: Vec<Lap>,
}

impl Stint {
    /// Laps run in the stint, before any outlier filtering
    pub fn length(&self) -> usize {
        self.laps.len()
    }
}

/// Stint number for every lap. A new stint starts whenever the compound
/// differs from the previous lap's compound.
pub fn tag_stints(laps: &[Lap]) -> Vec<u32> {
    let mut stint_number = 0;
    let mut prev_compound = None;
    laps.iter()
        .map(|lap| {
            if prev_compound != Some(lap.compound) {
                stint_number += 1;
                prev_compound = Some(lap.compound);
            }
            stint_number
        })
        .collect()
}

/// Split a driver's ordered laps into stints. No minimum length is enforced,
/// a single glitched lap on another compound becomes its own stint.
pub fn segment(laps: &[Lap]) -> Vec<Stint> {
    laps.iter()
        .zip(tag_stints(laps))
        .chunk_by(|(_, stint_number)| *stint_number)
        .into_iter()
        .filter_map(|(stint_number, group)| {
            let laps = group.map(|(lap, _)| lap.clone()).collect_vec();
            let first = laps.first()?;
            let last = laps.last()?;
            Some(Stint {
                stint_number,
                compound: first.compound,
                start_lap: first.lap_number,
                end_lap: last.lap_number,
                tyre_age_start: first.tyre_age,
                laps,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn laps_with(compounds: &[Compound]) -> Vec<Lap> {
        compounds
            .iter()
            .enumerate()
            .map(|(i, compound)| Lap::new("VER", i as u32 + 1, Some(90.), *compound, i as u32 + 1))
            .collect()
    }

    #[test]
    fn test_compound_changes_start_new_stints() {
        use Compound::*;
        let laps = laps_with(&[Soft, Soft, Soft, Medium, Medium, Hard]);

        assert_eq!(tag_stints(&laps), vec![1, 1, 1, 2, 2, 3]);

        let stints = segment(&laps);
        assert_eq!(stints.len(), 3);
        assert_eq!(stints.iter().map(Stint::length).collect_vec(), vec![3, 2, 1]);
        assert_eq!(stints.iter().map(|s| s.stint_number).collect_vec(), vec![1, 2, 3]);
        assert_eq!(stints[1].compound, Medium);
        assert_eq!((stints[1].start_lap, stints[1].end_lap), (4, 5));
        assert_eq!(stints[1].tyre_age_start, 4);
    }

    #[test]
    fn test_glitch_lap_gets_its_own_stint() {
        use Compound::*;
        let laps = laps_with(&[Medium, Medium, Soft, Medium, Medium]);
        let stints = segment(&laps);
        assert_eq!(stints.iter().map(Stint::length).collect_vec(), vec![2, 1, 2]);
        assert_eq!(stints[2].stint_number, 3);
    }

    #[test]
    fn test_empty_input() {
        assert!(segment(&[]).is_empty());
        assert!(tag_stints(&[]).is_empty());
    }

    fn compound_strategy() -> impl Strategy<Value = Compound> {
        prop_oneof![
            Just(Compound::Soft),
            Just(Compound::Medium),
            Just(Compound::Hard),
            Just(Compound::Intermediate),
            Just(Compound::Wet),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_stints_cover_every_lap_in_order(
            compounds in prop::collection::vec(compound_strategy(), 0..60),
        ) {
            let laps = laps_with(&compounds);
            let stints = segment(&laps);

            prop_assert_eq!(stints.iter().map(Stint::length).sum::<usize>(), laps.len());
            for (i, stint) in stints.iter().enumerate() {
                prop_assert_eq!(stint.stint_number, i as u32 + 1);
                prop_assert!(stint.laps.iter().all(|lap| lap.compound == stint.compound));
            }
            for pair in stints.windows(2) {
                prop_assert_ne!(pair[0].compound, pair[1].compound);
            }
        }
    }
}
