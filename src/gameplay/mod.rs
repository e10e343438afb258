pub mod bike;
pub mod road;

use bevy::prelude::*;
use bike::BikeGameplayPlugin;
use road::RoadPlugin;

pub struct GameplayPlugin;

impl Plugin for GameplayPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(RoadPlugin).add_plugins(BikeGameplayPlugin);
    }
}
