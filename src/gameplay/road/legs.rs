use crate::config::LegConfig;
use bevy::prelude::*;

pub const CHECKPOINTS_PER_LEG: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct Leg {
    pub id: String,
    pub name: String,
    pub difficulty: String,
    pub time_of_day: String,
    pub landscape: String,
    pub weather: String,
    pub start_segment: usize,
    pub end_segment: usize,
}

impl Leg {
    pub fn segment_count(&self) -> usize {
        self.end_segment - self.start_segment + 1
    }

    pub fn contains(&self, segment: usize) -> bool {
        (self.start_segment..=self.end_segment).contains(&segment)
    }

    /// Evenly spaced segment indices inside the leg; the last one is the leg's end.
    pub fn checkpoints(&self) -> [usize; CHECKPOINTS_PER_LEG] {
        let span = self.end_segment - self.start_segment;
        std::array::from_fn(|slot| {
            self.start_segment + ((span * (slot + 1)) / CHECKPOINTS_PER_LEG)
        })
    }
}

#[derive(Resource, Debug, Clone, Default)]
pub struct TrackLegs {
    legs: Vec<Leg>,
}

impl TrackLegs {
    pub fn legs(&self) -> &[Leg] {
        &self.legs
    }

    pub fn len(&self) -> usize {
        self.legs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Leg> {
        self.legs.get(index)
    }

    pub fn total_segments(&self) -> usize {
        self.legs.last().map_or(0, |leg| leg.end_segment + 1)
    }

    pub fn leg_for_segment(&self, segment: usize) -> Option<usize> {
        self.legs.iter().position(|leg| leg.contains(segment))
    }
}

/// Lays legs end to end along the road in config order.
pub fn partition_legs(configs: &[LegConfig]) -> TrackLegs {
    let mut start_segment = 0;
    let legs = configs
        .iter()
        .map(|config| {
            let end_segment = start_segment + config.segments.max(1) - 1;
            let leg = Leg {
                id: config.id.clone(),
                name: config.name.clone(),
                difficulty: config.difficulty.clone(),
                time_of_day: config.time_of_day.clone(),
                landscape: config.landscape.clone(),
                weather: config.weather.clone(),
                start_segment,
                end_segment,
            };
            start_segment = end_segment + 1;
            leg
        })
        .collect();

    TrackLegs { legs }
}

#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointReachedEvent {
    pub leg_index: usize,
    /// 1-based position of the checkpoint inside the leg.
    pub checkpoint: usize,
    pub segment: usize,
}

#[derive(Message, Debug, Clone, Copy, PartialEq)]
pub struct LegCompletedEvent {
    pub leg_index: usize,
    pub elapsed_seconds: f32,
    pub final_leg: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProgressUpdate {
    pub checkpoints: usize,
    pub leg_completed: bool,
}

/// Tracks which checkpoints the rider has passed in the active leg.
#[derive(Component, Debug, Clone, Default)]
pub struct LegProgress {
    pub leg_index: usize,
    pub checkpoints_passed: usize,
    pub leg_elapsed_seconds: f32,
    pub finished: bool,
}

impl LegProgress {
    pub fn start_leg(&mut self, leg_index: usize) {
        *self = Self {
            leg_index,
            ..default()
        };
    }

    /// Counts every checkpoint at or behind `segment` that was not already passed.
    pub fn advance(&mut self, leg: &Leg, segment: usize) -> ProgressUpdate {
        if self.finished {
            return ProgressUpdate::default();
        }

        let checkpoints = leg.checkpoints();
        let before = self.checkpoints_passed;
        while self.checkpoints_passed < CHECKPOINTS_PER_LEG
            && segment >= checkpoints[self.checkpoints_passed]
        {
            self.checkpoints_passed += 1;
        }

        let leg_completed = self.checkpoints_passed == CHECKPOINTS_PER_LEG;
        if leg_completed {
            self.finished = true;
        }

        ProgressUpdate {
            checkpoints: self.checkpoints_passed - before,
            leg_completed,
        }
    }

    /// Segment to respawn on after a crash: the last checkpoint passed, or the leg start.
    pub fn respawn_segment(&self, leg: &Leg) -> usize {
        match self.checkpoints_passed {
            0 => leg.start_segment,
            passed => leg.checkpoints()[passed - 1],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leg_config(id: &str, segments: usize) -> LegConfig {
        LegConfig {
            id: id.to_string(),
            name: id.to_uppercase(),
            segments,
            difficulty: "easy".to_string(),
            time_of_day: "day".to_string(),
            landscape: "coast".to_string(),
            weather: "clear".to_string(),
            obstacles: Vec::new(),
        }
    }

    #[test]
    fn legs_partition_the_road_without_gaps() {
        let legs = partition_legs(&[leg_config("a", 100), leg_config("b", 120), leg_config("c", 80)]);

        assert_eq!(legs.len(), 3);
        assert_eq!(legs.total_segments(), 300);
        for pair in legs.legs().windows(2) {
            assert_eq!(pair[1].start_segment, pair[0].end_segment + 1);
        }
        assert_eq!(legs.get(1).map(Leg::segment_count), Some(120));
        assert_eq!(legs.leg_for_segment(219), Some(1));
        assert_eq!(legs.leg_for_segment(220), Some(2));
        assert_eq!(legs.leg_for_segment(300), None);
    }

    #[test]
    fn ten_checkpoints_end_on_the_last_segment() {
        let legs = partition_legs(&[leg_config("a", 100), leg_config("b", 201)]);
        let leg = &legs.legs()[1];
        let checkpoints = leg.checkpoints();

        assert_eq!(checkpoints.len(), CHECKPOINTS_PER_LEG);
        assert_eq!(checkpoints[0], 120);
        assert_eq!(checkpoints[9], leg.end_segment);
        for pair in checkpoints.windows(2) {
            assert_eq!(pair[1] - pair[0], 20);
        }
    }

    #[test]
    fn progress_counts_checkpoints_once_and_completes_the_leg() {
        let legs = partition_legs(&[leg_config("a", 101)]);
        let leg = &legs.legs()[0];
        let mut progress = LegProgress::default();

        assert_eq!(progress.advance(leg, 5).checkpoints, 0);
        assert_eq!(progress.respawn_segment(leg), 0);

        let update = progress.advance(leg, 35);
        assert_eq!(update.checkpoints, 3);
        assert_eq!(progress.respawn_segment(leg), 30);
        assert_eq!(progress.advance(leg, 35).checkpoints, 0);

        let update = progress.advance(leg, 100);
        assert_eq!(update.checkpoints, 7);
        assert!(update.leg_completed);
        assert_eq!(progress.advance(leg, 100), ProgressUpdate::default());

        progress.start_leg(1);
        assert_eq!(progress.leg_index, 1);
        assert_eq!(progress.checkpoints_passed, 0);
        assert!(!progress.finished);
    }
}
