use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Dot {
    x: f32,
    y: f32,
    age: u32,
}

/// Fully coherent random-dot kinematogram in a circular aperture.
///
/// Positions are relative to the field centre, in pixels, with y pointing
/// down. A dot that outlives `life` frames or leaves the aperture is
/// replotted at a uniformly random point inside it.
#[derive(Debug, Clone)]
pub struct DotField {
    rng: StdRng,
    dots: Vec<Dot>,
    radius: f32,
    speed: f32,
    life: u32,
    step: (f32, f32),
    frame: usize,
}

impl DotField {
    pub fn new(n_dots: usize, radius: f32, speed: f32, life: u32, seed: u64) -> Self {
        let mut field = Self {
            rng: StdRng::seed_from_u64(seed),
            dots: Vec::with_capacity(n_dots),
            radius: radius.max(0.0),
            speed,
            life: life.max(1),
            step: (speed, 0.0),
            frame: 0,
        };
        field.dots = (0..n_dots).map(|_| field.spawn_dot(true)).collect();
        field
    }

    /// Replots every dot and sets a new motion direction, in degrees
    /// counterclockwise from rightward.
    pub fn reset(&mut self, direction_deg: f64) {
        let rad = direction_deg.to_radians();
        self.step = (
            self.speed * rad.cos() as f32,
            -self.speed * rad.sin() as f32,
        );
        self.frame = 0;
        for i in 0..self.dots.len() {
            self.dots[i] = self.spawn_dot(true);
        }
    }

    pub fn frame(&self) -> usize {
        self.frame
    }

    pub fn step(&mut self) {
        for i in 0..self.dots.len() {
            let dot = self.dots[i];
            let moved = Dot {
                x: dot.x + self.step.0,
                y: dot.y + self.step.1,
                age: dot.age + 1,
            };
            self.dots[i] = if moved.age >= self.life || !self.contains(moved.x, moved.y) {
                self.spawn_dot(false)
            } else {
                moved
            };
        }
        self.frame += 1;
    }

    /// Steps forward until the field shows `frame`. Earlier frames are
    /// not replayed.
    pub fn advance_to(&mut self, frame: usize) {
        while self.frame < frame {
            self.step();
        }
    }

    pub fn positions(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        self.dots.iter().map(|d| (d.x, d.y))
    }

    pub fn len(&self) -> usize {
        self.dots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dots.is_empty()
    }

    fn contains(&self, x: f32, y: f32) -> bool {
        x * x + y * y <= self.radius * self.radius
    }

    fn spawn_dot(&mut self, random_age: bool) -> Dot {
        // Square-root radius keeps the density uniform over the disc.
        let r = self.radius * self.rng.random::<f32>().sqrt();
        let theta = self.rng.random_range(0.0..std::f32::consts::TAU);
        let age = if random_age {
            self.rng.random_range(0..self.life)
        } else {
            0
        };
        Dot {
            x: r * theta.cos(),
            y: r * theta.sin(),
            age,
        }
    }
}
