//! Seeded heats filled in order.

use tracing::{debug, warn};

use super::{FormatContext, GeneratedRound, RoundFormat, RoundPlan};
use crate::race::{Race, Round};
use crate::types::{BandType, Channel};

/// Fills races one at a time with pilots in plan order.
///
/// Each race takes `ceil(pilots / races)` pilots. A pilot keeps the channel
/// they flew in the calling round whenever its frequency is free in the race,
/// even if the plan no longer offers it; otherwise they get the first free
/// plan channel of the same band type. Pilots without a candidate are
/// reported as unassigned.
#[derive(Debug, Clone, Copy, Default)]
pub struct TopFormat;

impl TopFormat {
    fn pick_channel<'a>(
        plan: &'a RoundPlan,
        race: &Race,
        previous: Option<&'a Channel>,
    ) -> Option<&'a Channel> {
        if let Some(previous) = previous
            && race.is_frequency_free(previous)
        {
            return Some(previous);
        }

        let band_type = previous.map_or(BandType::Analogue, Channel::band_type);
        let mut candidates = plan
            .channels
            .iter()
            .filter(|c| c.band_type() == band_type)
            .filter(|c| race.pilot_on_channel(c.id).is_none() && race.is_frequency_free(c));

        let first = candidates.next()?;
        let stable = previous
            .and_then(|prev| std::iter::once(first).chain(candidates).find(|c| c.id == prev.id));
        Some(stable.unwrap_or(first))
    }
}

impl RoundFormat for TopFormat {
    fn name(&self) -> &str {
        "Top"
    }

    fn generate_round(
        &self,
        context: &FormatContext<'_>,
        pre_existing: &[Race],
        new_round: &Round,
        plan: &RoundPlan,
    ) -> GeneratedRound {
        let heats = plan.number_of_races;
        if heats == 0 {
            return GeneratedRound::default();
        }

        let start_number = pre_existing.len() as u32;
        let mut races: Vec<Race> = (1..=heats as u32)
            .map(|i| {
                let mut race = Race::new(new_round.id, start_number + i);
                race.primary_timing_system_location = context.primary_timing_system_location;
                race.target_laps = plan.target_laps;
                race
            })
            .collect();

        let pilots_per_race = plan.pilots.len().div_ceil(heats);
        let mut unassigned = Vec::new();
        let mut race_index = 0;

        for &pilot in &plan.pilots {
            let Some(race) = races.get_mut(race_index) else {
                unassigned.push(pilot);
                continue;
            };

            let previous = context.channel_in_round(pilot, plan.calling_round);
            match Self::pick_channel(plan, race, previous) {
                Some(channel) => match race.set_pilot(channel, pilot) {
                    Ok(()) => {
                        debug!(race = race.race_number, pilot = %pilot, %channel, "Pilot seeded");
                    }
                    Err(e) => {
                        warn!(race = race.race_number, pilot = %pilot, "Could not seat pilot: {}", e);
                        unassigned.push(pilot);
                    }
                },
                None => {
                    warn!(
                        race = race.race_number,
                        pilot = %pilot,
                        band_type = ?previous.map_or(BandType::Analogue, Channel::band_type),
                        "No free channel of the pilot's band type"
                    );
                    unassigned.push(pilot);
                }
            }

            if race.pilot_count() >= pilots_per_race {
                race_index += 1;
            }
        }

        debug!(
            round = %new_round,
            races = races.len(),
            unassigned = unassigned.len(),
            "Top format round generated"
        );
        GeneratedRound { races, unassigned }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::race::{PrimaryTimingSystemLocation, RoundType};
    use crate::test_utils::{pilots, raceband};
    use crate::types::{PilotId, RoundId};

    fn plan(pilot_count: usize, heats: usize) -> RoundPlan {
        RoundPlan {
            pilots: pilots(pilot_count),
            channels: raceband(),
            number_of_races: heats,
            calling_round: None,
            target_laps: 4,
        }
    }

    fn counts(generated: &GeneratedRound) -> Vec<usize> {
        generated.races.iter().map(Race::pilot_count).collect()
    }

    #[test]
    fn nine_pilots_in_three_heats() {
        let round = Round::new(1, RoundType::Round);
        let generated = TopFormat.generate_round(&FormatContext::default(), &[], &round, &plan(9, 3));
        assert_eq!(counts(&generated), vec![3, 3, 3]);
        assert!(generated.unassigned.is_empty());
    }

    #[test]
    fn ten_pilots_fill_races_in_order() {
        let round = Round::new(1, RoundType::Round);
        let generated = TopFormat.generate_round(&FormatContext::default(), &[], &round, &plan(10, 3));
        assert_eq!(counts(&generated), vec![4, 4, 2]);
        assert_eq!(generated.assigned_pilots(), 10);
    }

    #[test]
    fn races_are_stamped_and_numbered_after_existing_ones() {
        let round = Round::new(3, RoundType::Final);
        let existing = vec![Race::new(round.id, 1), Race::new(round.id, 2)];
        let context = FormatContext::new(&[], PrimaryTimingSystemLocation::EndOfLap);
        let generated = TopFormat.generate_round(&context, &existing, &round, &plan(4, 2));

        let numbers: Vec<u32> = generated.races.iter().map(|r| r.race_number).collect();
        assert_eq!(numbers, vec![3, 4]);
        for race in &generated.races {
            assert_eq!(race.round, round.id);
            assert_eq!(race.target_laps, 4);
            assert_eq!(race.primary_timing_system_location, PrimaryTimingSystemLocation::EndOfLap);
        }
    }

    #[test]
    fn zero_heats_is_empty() {
        let round = Round::new(1, RoundType::Round);
        let generated = TopFormat.generate_round(&FormatContext::default(), &[], &round, &plan(5, 0));
        assert!(generated.is_empty());
        assert!(generated.unassigned.is_empty());
    }

    #[test]
    fn pilots_keep_their_previous_channel() {
        let channels = raceband();
        let calling = RoundId::new();
        let (a, b) = (PilotId::new(), PilotId::new());

        let mut previous = Race::new(calling, 1);
        previous.set_pilot(&channels[5], a).expect("assign");
        previous.set_pilot(&channels[2], b).expect("assign");
        let history = vec![previous];

        let plan = RoundPlan {
            pilots: vec![a, b],
            channels: channels.clone(),
            number_of_races: 1,
            calling_round: Some(calling),
            target_laps: 3,
        };
        let round = Round::new(2, RoundType::Final);
        let context = FormatContext::new(&history, PrimaryTimingSystemLocation::Holeshot);
        let generated = TopFormat.generate_round(&context, &[], &round, &plan);

        let race = &generated.races[0];
        assert_eq!(race.channel_of(a).map(|c| c.id), Some(channels[5].id));
        assert_eq!(race.channel_of(b).map(|c| c.id), Some(channels[2].id));
    }

    #[test]
    fn previous_channel_is_kept_when_the_plan_omits_it() {
        let channels = raceband();
        let calling = RoundId::new();
        let pilot = PilotId::new();

        let mut previous = Race::new(calling, 1);
        previous.set_pilot(&channels[5], pilot).expect("assign");
        let history = vec![previous];

        let plan = RoundPlan {
            pilots: vec![pilot],
            channels: channels[..4].to_vec(),
            number_of_races: 1,
            calling_round: Some(calling),
            target_laps: 3,
        };
        let round = Round::new(2, RoundType::Final);
        let context = FormatContext::new(&history, PrimaryTimingSystemLocation::Holeshot);
        let generated = TopFormat.generate_round(&context, &[], &round, &plan);

        let seated = generated.races[0].channel_of(pilot).expect("seated");
        assert_eq!(seated.id, channels[5].id);
        assert_eq!(seated.number, 6);
    }

    #[test]
    fn band_type_is_respected() {
        let digital = Channel::dji_fpv();
        let analogue = raceband();
        let calling = RoundId::new();
        let pilot = PilotId::new();
        let clash = PilotId::new();

        // Both flew the same digital channel in different heats
        let mut first = Race::new(calling, 1);
        first.set_pilot(&digital[0], clash).expect("assign");
        let mut second = Race::new(calling, 2);
        second.set_pilot(&digital[0], pilot).expect("assign");
        let history = vec![first, second];

        let mut channels = analogue.clone();
        channels.extend(digital[1..3].iter().cloned());
        let plan = RoundPlan {
            pilots: vec![clash, pilot],
            channels,
            number_of_races: 1,
            calling_round: Some(calling),
            target_laps: 3,
        };
        let round = Round::new(2, RoundType::Final);
        let context = FormatContext::new(&history, PrimaryTimingSystemLocation::Holeshot);
        let generated = TopFormat.generate_round(&context, &[], &round, &plan);

        let race = &generated.races[0];
        assert_eq!(race.channel_of(clash).map(|c| c.id), Some(digital[0].id));
        assert_eq!(race.channel_of(pilot).map(|c| c.id), Some(digital[1].id));
    }

    #[test]
    fn pilots_without_a_matching_channel_are_reported() {
        let round = Round::new(1, RoundType::Round);
        let mut plan = plan(3, 1);
        plan.channels = raceband().into_iter().take(2).collect();
        let generated = TopFormat.generate_round(&FormatContext::default(), &[], &round, &plan);

        assert_eq!(counts(&generated), vec![2]);
        assert_eq!(generated.unassigned, vec![plan.pilots[2]]);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;
        use std::collections::HashSet;

        proptest! {
            #[test]
            fn no_channel_or_frequency_is_shared(
                pilot_count in 0usize..40,
                heats in 1usize..8,
            ) {
                let round = Round::new(1, RoundType::Round);
                let plan = plan(pilot_count, heats);
                let generated =
                    TopFormat.generate_round(&FormatContext::default(), &[], &round, &plan);

                prop_assert_eq!(generated.races.len(), heats);
                prop_assert_eq!(generated.assigned_pilots() + generated.unassigned.len(), pilot_count);

                let per_race = pilot_count.div_ceil(heats);
                for race in &generated.races {
                    prop_assert!(race.pilot_count() <= per_race);
                    let frequencies: HashSet<u16> = race.channels().map(|c| c.frequency).collect();
                    prop_assert_eq!(frequencies.len(), race.pilot_count());
                }
            }
        }
    }
}
