//! Synthetic frames for tests and benches.
//!
//! Every generator is deterministic in its seed. Frames share the same
//! feature layout:
//!
//! | column  | type        | content                                  |
//! |---------|-------------|------------------------------------------|
//! | `x0`    | numeric     | uniform in `[-1, 1]`                     |
//! | `x1`    | numeric     | uniform in `[-1, 1]`, ~5% missing        |
//! | `noise` | numeric     | uniform in `[-1, 1]`, unrelated to `y`   |
//! | `color` | categorical | `blue` / `green` / `red`                 |
//!
//! plus a response column `y` whose signal is a step in `x0`, a slope in `x1`
//! and a bump for `color == red`.

use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::data::{Column, Frame};

/// Levels of the `color` feature, in code order.
pub const COLORS: [&str; 3] = ["blue", "green", "red"];

struct Features {
    x0: Vec<f32>,
    x1: Vec<f32>,
    noise: Vec<f32>,
    color: Vec<f32>,
}

impl Features {
    fn generate(rows: usize, rng: &mut Xoshiro256PlusPlus) -> Self {
        let uniform = |rng: &mut Xoshiro256PlusPlus| rng.gen_range(-1.0f32..1.0);
        let x0 = (0..rows).map(|_| uniform(rng)).collect();
        let x1 = (0..rows)
            .map(|_| {
                let v = uniform(rng);
                if rng.gen_bool(0.05) { f32::NAN } else { v }
            })
            .collect();
        let noise = (0..rows).map(|_| uniform(rng)).collect();
        let color = (0..rows).map(|_| rng.gen_range(0..COLORS.len()) as f32).collect();
        Self { x0, x1, noise, color }
    }

    /// Latent score shared by all response types.
    fn signal(&self, i: usize) -> f32 {
        let step = if self.x0[i] > 0.0 { 2.0 } else { -1.0 };
        let slope = if self.x1[i].is_nan() { 0.0 } else { self.x1[i] };
        let bump = if self.color[i] == 2.0 { 1.5 } else { 0.0 };
        step + slope + bump
    }

    fn into_columns(self, response: Column) -> Vec<Column> {
        vec![
            Column::numeric("x0", self.x0),
            Column::numeric("x1", self.x1),
            Column::numeric("noise", self.noise),
            Column::categorical("color", self.color, COLORS.iter().map(|c| c.to_string()).collect()),
            response,
        ]
    }
}

/// Numeric response with small gaussian-ish noise. Frame id `regression`.
pub fn regression_frame(rows: usize, seed: u64) -> Frame {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let features = Features::generate(rows, &mut rng);
    let y: Vec<f32> = (0..rows)
        .map(|i| features.signal(i) + 0.1 * (rng.r#gen::<f32>() + rng.r#gen::<f32>() - 1.0))
        .collect();
    frame("regression", features.into_columns(Column::numeric("y", y)))
}

/// Two-class response `no` / `yes` drawn from a logistic model. Frame id `binomial`.
pub fn binomial_frame(rows: usize, seed: u64) -> Frame {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let features = Features::generate(rows, &mut rng);
    let codes: Vec<f32> = (0..rows)
        .map(|i| {
            let p = 1.0 / (1.0 + (-2.0 * (features.signal(i) - 0.5)).exp());
            f32::from(u8::from(rng.r#gen::<f32>() < p))
        })
        .collect();
    let y = Column::categorical("y", codes, vec!["no".into(), "yes".into()]);
    frame("binomial", features.into_columns(y))
}

/// Three-class response `a` / `b` / `c` by thresholds on the signal. Frame id `multinomial`.
pub fn multinomial_frame(rows: usize, seed: u64) -> Frame {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let features = Features::generate(rows, &mut rng);
    let codes: Vec<f32> = (0..rows)
        .map(|i| {
            let s = features.signal(i) + 0.3 * (rng.r#gen::<f32>() - 0.5);
            if s < 0.0 {
                0.0
            } else if s < 2.0 {
                1.0
            } else {
                2.0
            }
        })
        .collect();
    let y = Column::categorical("y", codes, vec!["a".into(), "b".into(), "c".into()]);
    frame("multinomial", features.into_columns(y))
}

fn frame(id: &str, columns: Vec<Column>) -> Frame {
    match Frame::new(id, columns) {
        Ok(frame) => frame,
        Err(err) => unreachable!("generated columns are consistent: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generators_are_deterministic() {
        let a = regression_frame(50, 3);
        let b = regression_frame(50, 3);
        assert_eq!(a.column("y").unwrap().values(), b.column("y").unwrap().values());
        assert_eq!(a.names(), vec!["x0", "x1", "noise", "color", "y"]);
    }

    #[test]
    fn classification_frames_use_every_class() {
        let y = binomial_frame(300, 1);
        let codes = y.column("y").unwrap().values();
        assert!(codes.contains(&0.0) && codes.contains(&1.0));

        let y = multinomial_frame(300, 1);
        let codes = y.column("y").unwrap().values();
        for k in 0..3 {
            assert!(codes.contains(&(k as f32)));
        }
    }
}
