use rand::Rng;

// --- Screen Constants ---
pub const WIN_WIDTH: f32 = 500.0;
pub const WIN_HEIGHT: f32 = 800.0;
pub const FLOOR_Y: f32 = 730.0; // Top surface of the ground
pub const CEILING_SLACK: f32 = 50.0; // How far above the screen an actor may rise

// Fixed simulation rate. Every constant below assumes one tick per step.
pub const TICK_RATE_HZ: f64 = 180.0;

// --- Actor Constants ---
pub const ACTOR_START_X: f32 = 230.0;
pub const ACTOR_START_Y: f32 = 350.0;
pub const ACTOR_WIDTH: u32 = 68;
pub const ACTOR_HEIGHT: u32 = 48;

pub const FLAP_VELOCITY: f32 = -10.5;
pub const ACCELERATION: f32 = 3.0;
pub const TERMINAL_DISPLACEMENT: f32 = 16.0; // Per-tick downward cap
pub const RISE_BOOST: f32 = 2.0; // Extra lift applied while moving up
pub const LAUNCH_BUFFER: f32 = 50.0;

pub const MAX_ROTATION: f32 = 25.0;
pub const MIN_ROTATION: f32 = -90.0;
pub const ROTATION_VELOCITY: f32 = 20.0;
pub const DIVE_ROTATION: f32 = -80.0;

pub const ANIMATION_TIME: u32 = 5;
pub const FRAME_COUNT: usize = 3;
const GLIDE_FRAME: usize = 1;

// --- Obstacle Constants ---
pub const OBSTACLE_SPAWN_X: f32 = 600.0;
pub const OBSTACLE_VELOCITY: f32 = 5.0;
pub const OBSTACLE_WIDTH: u32 = 104;
pub const OBSTACLE_HEIGHT: u32 = 640;
pub const GAP_HEIGHT: f32 = 200.0;
pub const GAP_CENTER_MIN: i32 = 150;
pub const GAP_CENTER_MAX: i32 = 549; // Inclusive

// --- Ground Constants ---
pub const GROUND_VELOCITY: f32 = 5.0;
pub const GROUND_TILE_WIDTH: f32 = 672.0;
pub const GROUND_TILE_HEIGHT: f32 = 224.0;

// === Actor ===

/// The physical body of one agent. Only `y`, velocity, rotation and the
/// animation state change over its lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct Actor {
    pub x: f32,
    pub y: f32,
    pub velocity: f32,
    pub tick_count: u32,
    pub launch_height: f32,
    pub rotation: f32,
    animation_ticks: u32,
    frame: usize,
}

impl Default for Actor {
    fn default() -> Self {
        Self::new(ACTOR_START_X, ACTOR_START_Y)
    }
}

impl Actor {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            velocity: 0.0,
            tick_count: 0,
            launch_height: y,
            rotation: 0.0,
            animation_ticks: 0,
            frame: 0,
        }
    }

    pub fn impulse(&mut self) {
        self.velocity = FLAP_VELOCITY;
        self.tick_count = 0;
        self.launch_height = self.y;
    }

    pub fn advance(&mut self) {
        self.tick_count += 1;
        let t = self.tick_count as f32;

        let mut displacement = self.velocity * t + 0.5 * ACCELERATION * t * t;
        if displacement >= TERMINAL_DISPLACEMENT {
            displacement = TERMINAL_DISPLACEMENT;
        }
        if displacement < 0.0 {
            displacement -= RISE_BOOST;
        }
        self.y += displacement;

        if displacement < 0.0 || self.y < self.launch_height + LAUNCH_BUFFER {
            if self.rotation < MAX_ROTATION {
                self.rotation = MAX_ROTATION;
            }
        } else {
            self.rotation = (self.rotation - ROTATION_VELOCITY).max(MIN_ROTATION);
        }

        self.animate();
    }

    // Wing cycle 0,1,2,1,0 with ANIMATION_TIME ticks per phase.
    fn animate(&mut self) {
        self.animation_ticks += 1;
        let phase = self.animation_ticks;
        self.frame = if phase <= ANIMATION_TIME {
            0
        } else if phase <= ANIMATION_TIME * 2 {
            1
        } else if phase <= ANIMATION_TIME * 3 {
            2
        } else if phase <= ANIMATION_TIME * 4 {
            1
        } else {
            self.animation_ticks = 0;
            0
        };

        if self.rotation <= DIVE_ROTATION {
            self.frame = GLIDE_FRAME;
            self.animation_ticks = ANIMATION_TIME * 2;
        }
    }

    pub fn frame(&self) -> usize {
        self.frame
    }

    pub fn bottom(&self) -> f32 {
        self.y + ACTOR_HEIGHT as f32
    }
}

// === Obstacle ===

/// A pair of barriers separated by a fixed vertical gap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obstacle {
    pub x: f32,
    pub gap_center: f32,
    /// Bottom edge of the top barrier.
    pub top_edge: f32,
    /// Top edge of the bottom barrier.
    pub bottom_edge: f32,
    pub passed: bool,
}

impl Obstacle {
    pub fn spawn<R: Rng + ?Sized>(x: f32, rng: &mut R) -> Self {
        let center = rng.gen_range(GAP_CENTER_MIN..=GAP_CENTER_MAX);
        Self::with_gap_center(x, center as f32)
    }

    pub fn with_gap_center(x: f32, gap_center: f32) -> Self {
        Self {
            x,
            gap_center,
            top_edge: gap_center - GAP_HEIGHT / 2.0,
            bottom_edge: gap_center + GAP_HEIGHT / 2.0,
            passed: false,
        }
    }

    pub fn advance(&mut self) {
        self.x -= OBSTACLE_VELOCITY;
    }

    pub fn right_edge(&self) -> f32 {
        self.x + OBSTACLE_WIDTH as f32
    }

    pub fn is_off_screen(&self) -> bool {
        self.right_edge() < 0.0
    }

    /// Top-left y of the (flipped) top barrier sprite.
    pub fn top_barrier_y(&self) -> f32 {
        self.top_edge - OBSTACLE_HEIGHT as f32
    }

    /// Top-left y of the bottom barrier sprite.
    pub fn bottom_barrier_y(&self) -> f32 {
        self.bottom_edge
    }
}

// === Ground ===

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ground {
    pub x1: f32,
    pub x2: f32,
}

impl Default for Ground {
    fn default() -> Self {
        Self {
            x1: 0.0,
            x2: GROUND_TILE_WIDTH,
        }
    }
}

impl Ground {
    pub fn advance(&mut self) {
        self.x1 -= GROUND_VELOCITY;
        self.x2 -= GROUND_VELOCITY;

        if self.x1 + GROUND_TILE_WIDTH < 0.0 {
            self.x1 = self.x2 + GROUND_TILE_WIDTH;
        }
        if self.x2 + GROUND_TILE_WIDTH < 0.0 {
            self.x2 = self.x1 + GROUND_TILE_WIDTH;
        }
    }

    pub fn offsets(&self) -> [f32; 2] {
        [self.x1, self.x2]
    }
}
