//! Sampled trajectory produced by an integration call.

use crate::error::{SimError, SimResult};
use crate::model::State;
use nalgebra::DMatrix;

/// Counters collected during one integration call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IntegrationStats {
    /// Total `rhs` calls, including those of rejected attempts.
    pub dynamics_evals: usize,
    /// Accepted internal steps.
    pub accepted_steps: usize,
    /// Rejected internal steps.
    pub rejected_steps: usize,
}

/// States sampled at the requested breakpoints.
///
/// `t[i]` is bit-identical to the i-th requested time and `x[i]` is the
/// integrated state there.
#[derive(Clone, Debug, Default)]
pub struct Trajectory {
    /// Time points (seconds)
    pub t: Vec<f64>,
    /// State snapshots
    pub x: Vec<State>,
    /// Step counters
    pub stats: IntegrationStats,
}

impl Trajectory {
    pub(crate) fn with_capacity(n: usize) -> Self {
        Self {
            t: Vec::with_capacity(n),
            x: Vec::with_capacity(n),
            stats: IntegrationStats::default(),
        }
    }

    pub(crate) fn push(&mut self, t: f64, x: State) {
        self.t.push(t);
        self.x.push(x);
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    /// Iterate over `(time, state)` pairs.
    pub fn samples(&self) -> impl Iterator<Item = (f64, &State)> {
        self.t.iter().copied().zip(self.x.iter())
    }

    /// Final sample, if any.
    pub fn last(&self) -> Option<(f64, &State)> {
        Some((*self.t.last()?, self.x.last()?))
    }

    /// Stack the states row-wise: row `i` is the state at `t[i]`.
    pub fn to_matrix(&self) -> DMatrix<f64> {
        let ncols = self.x.first().map_or(0, |x| x.len());
        DMatrix::from_fn(self.len(), ncols, |i, j| self.x[i][j])
    }

    /// Split each state into its leading `nq` position entries and the
    /// remaining velocity entries.
    pub fn split(&self, nq: usize) -> SimResult<(Vec<State>, Vec<State>)> {
        let mut positions = Vec::with_capacity(self.len());
        let mut velocities = Vec::with_capacity(self.len());
        for x in &self.x {
            if nq > x.len() {
                return Err(SimError::invalid(format!(
                    "position block size {nq} exceeds state dimension {}",
                    x.len()
                )));
            }
            positions.push(x.rows(0, nq).into_owned());
            velocities.push(x.rows(nq, x.len() - nq).into_owned());
        }
        Ok((positions, velocities))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trajectory() -> Trajectory {
        let mut traj = Trajectory::with_capacity(2);
        traj.push(0.0, State::from_vec(vec![1.0, 2.0, 3.0]));
        traj.push(0.5, State::from_vec(vec![4.0, 5.0, 6.0]));
        traj
    }

    #[test]
    fn split_positions_and_velocities() {
        let traj = sample_trajectory();
        let (q, v) = traj.split(2).unwrap();
        assert_eq!(q[1].as_slice(), &[4.0, 5.0]);
        assert_eq!(v[1].as_slice(), &[6.0]);
        assert!(traj.split(4).is_err());
    }

    #[test]
    fn matrix_rows_follow_times() {
        let traj = sample_trajectory();
        let m = traj.to_matrix();
        assert_eq!(m.shape(), (2, 3));
        assert_eq!(m[(1, 0)], 4.0);
        assert_eq!(traj.last().map(|(t, _)| t), Some(0.5));
        assert_eq!(traj.samples().count(), 2);
    }
}
