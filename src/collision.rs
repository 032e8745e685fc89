use once_cell::sync::Lazy;

use crate::physics::{
    Actor, Obstacle, ACTOR_HEIGHT, ACTOR_WIDTH, CEILING_SLACK, FLOOR_Y, FRAME_COUNT,
    OBSTACLE_HEIGHT, OBSTACLE_WIDTH,
};

const MAX_MASK_WIDTH: u32 = u128::BITS;

/// Bit-packed silhouette: one `u128` per row, bit `x` set when pixel `x` of
/// that row is opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    rows: Vec<u128>,
}

impl Mask {
    pub fn from_fn(width: u32, height: u32, opaque: impl Fn(u32, u32) -> bool) -> Self {
        assert!(width <= MAX_MASK_WIDTH, "mask width {} exceeds {}", width, MAX_MASK_WIDTH);
        let rows = (0..height)
            .map(|y| {
                (0..width)
                    .filter(|&x| opaque(x, y))
                    .fold(0u128, |row, x| row | (1u128 << x))
            })
            .collect();
        Self { width, height, rows }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && (self.rows[y as usize] >> x) & 1 == 1
    }

    #[cfg(test)]
    pub fn count(&self) -> u32 {
        self.rows.iter().map(|row| row.count_ones()).sum()
    }

    /// Nearest-neighbour upscale by two in both axes.
    pub fn scale2x(&self) -> Self {
        Self::from_fn(self.width * 2, self.height * 2, |x, y| self.get(x / 2, y / 2))
    }

    pub fn flip_vertical(&self) -> Self {
        let mut rows = self.rows.clone();
        rows.reverse();
        Self {
            width: self.width,
            height: self.height,
            rows,
        }
    }

    /// True when any opaque pixel of `other`, placed with its top-left corner
    /// at `offset` in this mask's coordinates, lands on an opaque pixel here.
    pub fn overlaps(&self, other: &Mask, offset: (i32, i32)) -> bool {
        let (dx, dy) = offset;
        if dx >= self.width as i32 || dx + other.width as i32 <= 0 {
            return false;
        }

        let first = dy.max(0);
        let last = (dy + other.height as i32).min(self.height as i32);
        (first..last).any(|y| {
            let theirs = other.rows[(y - dy) as usize];
            let aligned = if dx >= 0 {
                theirs.checked_shl(dx as u32).unwrap_or(0)
            } else {
                theirs.checked_shr(dx.unsigned_abs()).unwrap_or(0)
            };
            aligned & self.rows[y as usize] != 0
        })
    }
}

// --- Procedural sprite definitions (1x scale) ---

fn inside_ellipse(px: i64, py: i64, center: (i64, i64), radii: (i64, i64)) -> bool {
    // Doubled coordinates so pixel centres and half-pixel radii stay integral.
    let (cx, cy) = center;
    let (rx, ry) = radii;
    (px - cx).pow(2) * ry * ry + (py - cy).pow(2) * rx * rx <= rx * rx * ry * ry
}

const BIRD_BASE_WIDTH: u32 = ACTOR_WIDTH / 2;
const BIRD_BASE_HEIGHT: u32 = ACTOR_HEIGHT / 2;
const WING_ROWS: [i64; FRAME_COUNT] = [8, 12, 16];

fn bird_frame(frame: usize) -> Mask {
    let wing_row = WING_ROWS[frame];
    Mask::from_fn(BIRD_BASE_WIDTH, BIRD_BASE_HEIGHT, |x, y| {
        let (px, py) = (2 * x as i64 + 1, 2 * y as i64 + 1);
        let body = inside_ellipse(px, py, (32, 24), (24, 18));
        let beak = (27..=32).contains(&x) && (11..=14).contains(&y);
        let tail = (1..=4).contains(&x) && (9..=13).contains(&y);
        let wing = inside_ellipse(px, py, (20, 2 * wing_row), (12, 6));
        body || beak || tail || wing
    })
    .scale2x()
}

fn barrier() -> Mask {
    // Full-width lip on top of a shaft inset by one pixel (two once scaled) per side.
    Mask::from_fn(OBSTACLE_WIDTH / 2, OBSTACLE_HEIGHT / 2, |x, y| {
        y < 12 || (2..=49).contains(&x)
    })
    .scale2x()
}

/// Silhouettes for every sprite the oracle tests, built once.
#[derive(Debug)]
pub struct SpriteMasks {
    pub actor_frames: [Mask; FRAME_COUNT],
    pub top_barrier: Mask,
    pub bottom_barrier: Mask,
}

impl SpriteMasks {
    pub fn build() -> Self {
        let bottom_barrier = barrier();
        Self {
            actor_frames: [bird_frame(0), bird_frame(1), bird_frame(2)],
            top_barrier: bottom_barrier.flip_vertical(),
            bottom_barrier,
        }
    }

    pub fn shared() -> &'static SpriteMasks {
        static MASKS: Lazy<SpriteMasks> = Lazy::new(SpriteMasks::build);
        &MASKS
    }
}

fn rounded(value: f32) -> i32 {
    value.round() as i32
}

pub fn collides(actor: &Actor, obstacle: &Obstacle, masks: &SpriteMasks) -> bool {
    let actor_mask = &masks.actor_frames[actor.frame()];
    let dx = rounded(obstacle.x - actor.x);
    let actor_y = rounded(actor.y);

    let top_offset = (dx, rounded(obstacle.top_barrier_y()) - actor_y);
    let bottom_offset = (dx, rounded(obstacle.bottom_barrier_y()) - actor_y);

    actor_mask.overlaps(&masks.top_barrier, top_offset)
        || actor_mask.overlaps(&masks.bottom_barrier, bottom_offset)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Ground,
    Ceiling,
}

pub fn out_of_bounds(actor: &Actor) -> Option<Boundary> {
    if actor.bottom() >= FLOOR_Y {
        Some(Boundary::Ground)
    } else if actor.y < -CEILING_SLACK {
        Some(Boundary::Ceiling)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{ACTOR_START_X, OBSTACLE_SPAWN_X};

    fn masks() -> &'static SpriteMasks {
        SpriteMasks::shared()
    }

    #[test]
    fn masks_match_sprite_dimensions() {
        for frame in &masks().actor_frames {
            assert_eq!((frame.width(), frame.height()), (ACTOR_WIDTH, ACTOR_HEIGHT));
        }
        assert_eq!(masks().bottom_barrier.width(), OBSTACLE_WIDTH);
        assert_eq!(masks().bottom_barrier.height(), OBSTACLE_HEIGHT);
        assert_eq!(masks().top_barrier.height(), OBSTACLE_HEIGHT);
    }

    #[test]
    fn actor_silhouette_has_transparent_margin() {
        let frame = &masks().actor_frames[0];
        assert!(!frame.get(0, 0));
        assert!(!frame.get(ACTOR_WIDTH - 1, ACTOR_HEIGHT - 1));
        assert!(!frame.get(0, ACTOR_HEIGHT - 1));
        assert!(frame.get(ACTOR_WIDTH / 2, ACTOR_HEIGHT / 2));
        assert!(frame.count() < ACTOR_WIDTH * ACTOR_HEIGHT * 3 / 4);
    }

    #[test]
    fn wing_frames_differ() {
        let frames = &masks().actor_frames;
        assert_ne!(frames[0], frames[1]);
        assert_ne!(frames[1], frames[2]);
    }

    #[test]
    fn barrier_lip_is_full_width_and_shaft_is_inset() {
        let bottom = &masks().bottom_barrier;
        assert!(bottom.get(0, 0));
        assert!(bottom.get(OBSTACLE_WIDTH - 1, 23));
        assert!(!bottom.get(0, 24));
        assert!(!bottom.get(3, 300));
        assert!(bottom.get(4, 300));
        assert!(!bottom.get(OBSTACLE_WIDTH - 1, 300));

        let top = &masks().top_barrier;
        assert!(top.get(0, OBSTACLE_HEIGHT - 1));
        assert!(!top.get(0, 0));
    }

    #[test]
    fn scale2x_doubles_each_pixel() {
        let mask = Mask::from_fn(2, 1, |x, _| x == 1);
        let scaled = mask.scale2x();
        assert_eq!(scaled.width(), 4);
        assert_eq!(scaled.height(), 2);
        assert_eq!(scaled.count(), 4);
        assert!(scaled.get(2, 0) && scaled.get(3, 1));
        assert!(!scaled.get(1, 1));
    }

    #[test]
    fn overlap_respects_offsets() {
        let block = Mask::from_fn(4, 4, |_, _| true);
        assert!(block.overlaps(&block, (3, 3)));
        assert!(block.overlaps(&block, (-3, -3)));
        assert!(!block.overlaps(&block, (4, 0)));
        assert!(!block.overlaps(&block, (0, -4)));
        assert!(!block.overlaps(&block, (200, 0)));
        assert!(!block.overlaps(&block, (-200, 0)));
    }

    #[test]
    fn overlap_is_symmetric_and_reproducible() {
        let actor = &masks().actor_frames[2];
        let barrier = &masks().bottom_barrier;
        for dx in (-110..80).step_by(3) {
            for dy in (-60..60).step_by(5) {
                let forward = actor.overlaps(barrier, (dx, dy));
                assert_eq!(forward, barrier.overlaps(actor, (-dx, -dy)), "offset ({dx}, {dy})");
                assert_eq!(forward, actor.overlaps(barrier, (dx, dy)));
            }
        }
    }

    #[test]
    fn transparent_margin_does_not_collide() {
        // The lip's corner sits inside the actor's bounding box but only
        // covers the empty rows below the body.
        let actor = Actor::new(ACTOR_START_X, 300.0);
        let grazing = Obstacle::with_gap_center(ACTOR_START_X + 60.0, 244.0);
        assert_eq!(grazing.bottom_barrier_y(), 344.0);
        assert!(!collides(&actor, &grazing, masks()));

        let deep = Obstacle::with_gap_center(ACTOR_START_X + 30.0, 220.0);
        assert!(collides(&actor, &deep, masks()));
    }

    #[test]
    fn actor_inside_barrier_collides() {
        let actor = Actor::new(ACTOR_START_X, 400.0);
        let obstacle = Obstacle::with_gap_center(ACTOR_START_X, 250.0);
        assert!(collides(&actor, &obstacle, masks()));

        let clear = Obstacle::with_gap_center(OBSTACLE_SPAWN_X, 250.0);
        assert!(!collides(&actor, &clear, masks()));
    }

    #[test]
    fn actor_centered_in_gap_is_clear() {
        let actor = Actor::new(ACTOR_START_X, 276.0);
        let obstacle = Obstacle::with_gap_center(ACTOR_START_X - 10.0, 300.0);
        assert!(!collides(&actor, &obstacle, masks()));
    }

    #[test]
    fn bounds() {
        assert_eq!(out_of_bounds(&Actor::new(ACTOR_START_X, 682.0)), Some(Boundary::Ground));
        assert_eq!(out_of_bounds(&Actor::new(ACTOR_START_X, 681.5)), None);
        assert_eq!(out_of_bounds(&Actor::new(ACTOR_START_X, -50.0)), None);
        assert_eq!(out_of_bounds(&Actor::new(ACTOR_START_X, -50.5)), Some(Boundary::Ceiling));
    }
}
