//! Fixed node placement.
//!
//! Each node gets one constant position drawn uniformly from a rectangle.
//! Positions feed the radio channel's propagation delay; the wired channel
//! ignores them.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::debug;

use crate::error::SimResult;
use crate::node::NodeContainer;
use crate::world::World;

/// A point in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Position { x, y, z }
    }

    pub fn distance(&self, other: &Position) -> f64 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Uniform positions in `[0, width] × [0, height]`, `z = 0`.
#[derive(Debug, Clone)]
pub struct RandomRectanglePositionAllocator {
    width: f64,
    height: f64,
    rng: ChaCha8Rng,
}

impl RandomRectanglePositionAllocator {
    pub fn new(width: u32, height: u32, seed: u64) -> Self {
        RandomRectanglePositionAllocator {
            width: f64::from(width),
            height: f64::from(height),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn next_position(&mut self) -> Position {
        let x = self.rng.gen_range(0.0..=self.width);
        let y = self.rng.gen_range(0.0..=self.height);
        Position::new(x, y, 0.0)
    }
}

/// Assigns a constant position to every node it is installed on.
#[derive(Debug, Clone)]
pub struct MobilityHelper {
    allocator: RandomRectanglePositionAllocator,
}

impl MobilityHelper {
    pub fn new(allocator: RandomRectanglePositionAllocator) -> Self {
        MobilityHelper { allocator }
    }

    pub fn install(&mut self, world: &mut World, nodes: &NodeContainer) -> SimResult<()> {
        for id in nodes.iter() {
            let position = self.allocator.next_position();
            debug!(node = %id, x = position.x, y = position.y, "placed");
            world.node_mut(id)?.position = Some(position);
        }
        Ok(())
    }
}
