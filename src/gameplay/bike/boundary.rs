use crate::config::{ObstacleConfig, TrackConfig};
use crate::gameplay::road::{heading_right, Leg, TerrainSampler};
use bevy::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Road,
    Grass,
    OffTrack,
    Cliff,
    Collided,
}

impl Surface {
    /// Surfaces the bike cannot ride out of.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::OffTrack | Self::Cliff | Self::Collided)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackClassification {
    pub on_road: bool,
    pub perp_distance: f32,
    pub cliff_drop: bool,
    pub surface: Surface,
    pub segment_index: usize,
    /// Terrain height on the side of the road the bike is on.
    pub side_ground_y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obstacle {
    pub position: Vec3,
    pub radius: f32,
}

#[derive(Resource, Debug, Clone)]
pub struct TrackBoundaryPolicy {
    pub road_half_width: f32,
    pub off_road_tolerance: f32,
    pub cliff_drop_threshold: f32,
    pub grass_drag: f32,
    pub bike_collision_radius: f32,
    obstacles: Vec<Obstacle>,
}

impl TrackBoundaryPolicy {
    pub fn from_config(track: &TrackConfig) -> Self {
        Self {
            road_half_width: track.road_half_width,
            off_road_tolerance: track.off_road_tolerance,
            cliff_drop_threshold: track.cliff_drop_threshold,
            grass_drag: track.grass_drag,
            bike_collision_radius: track.bike_collision_radius,
            obstacles: Vec::new(),
        }
    }

    pub fn add_obstacle(&mut self, obstacle: Obstacle) {
        self.obstacles.push(obstacle);
    }

    /// Places a leg's configured obstacles beside its segments. Returns how many were added.
    pub fn add_leg_obstacles(
        &mut self,
        leg: &Leg,
        obstacles: &[ObstacleConfig],
        sampler: &TerrainSampler,
    ) -> usize {
        for obstacle in obstacles {
            let index = (leg.start_segment + obstacle.segment).min(leg.end_segment);
            let segment = sampler.segment(index);
            self.add_obstacle(Obstacle {
                position: segment.position + (heading_right(segment.heading) * obstacle.offset),
                radius: obstacle.radius,
            });
        }
        obstacles.len()
    }

    pub fn clear_obstacles(&mut self) {
        self.obstacles.clear();
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    pub fn classify(&self, position: Vec3, sampler: &TerrainSampler) -> TrackClassification {
        let segment_index = sampler.nearest_segment(position.x, position.z);
        let perp_distance = sampler.perpendicular_offset(position.x, position.z, segment_index);
        let on_road = perp_distance.abs() < self.road_half_width;

        let road_y = sampler.segment(segment_index).elevation();
        let side_ground_y = sampler.side_ground_elevation(segment_index, perp_distance);
        let cliff_drop = !on_road && (road_y - side_ground_y) > self.cliff_drop_threshold;

        let surface = if self.hits_obstacle(position) {
            Surface::Collided
        } else if cliff_drop {
            Surface::Cliff
        } else if perp_distance.abs() > self.road_half_width + self.off_road_tolerance {
            Surface::OffTrack
        } else if !on_road {
            Surface::Grass
        } else {
            Surface::Road
        };

        TrackClassification {
            on_road,
            perp_distance,
            cliff_drop,
            surface,
            segment_index,
            side_ground_y,
        }
    }

    /// Extra deceleration for riding on the verge.
    pub fn grass_drag(&self, classification: &TrackClassification) -> f32 {
        if classification.surface == Surface::Grass {
            self.grass_drag
        } else {
            0.0
        }
    }

    fn hits_obstacle(&self, position: Vec3) -> bool {
        let bike = Vec2::new(position.x, position.z);
        self.obstacles.iter().any(|obstacle| {
            let reach = obstacle.radius + self.bike_collision_radius;
            Vec2::new(obstacle.position.x, obstacle.position.z).distance_squared(bike) < reach * reach
        })
    }
}
