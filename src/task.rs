// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The unit of generator work, and the flag that stops it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::view::{FractalView, View};

/// A shared stop flag.  Clones share one flag; once set it stays set.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A token that has not been set.
    pub fn new() -> CancellationToken {
        CancellationToken::default()
    }

    /// Sets the flag for every holder of this token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Has anyone set the flag?
    #[inline]
    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Are these clones of one token?
    pub fn same_as(&self, other: &CancellationToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// One tile of one job.  Tasks are made by the partitioner, consumed
/// once by the generator, then discarded.
#[derive(Clone, Debug)]
pub struct Task {
    /// The job identifier.
    pub identifier: String,
    /// The whole view the tile belongs to; pixel mapping comes from here.
    pub fractal_view: FractalView,
    /// The tile's rectangle on the pixel plane.
    pub tile_pixel_view: View,
    /// The tile's rectangle on the complex plane.
    pub tile_complex_view: View,
    /// Shared by every task of one generator invocation.
    pub cancellation_token: CancellationToken,
}

impl Task {
    /// The tile's two rectangles as one view, for packaging a Response.
    pub fn tile_view(&self) -> FractalView {
        FractalView::new(self.tile_pixel_view, self.tile_complex_view)
    }
}

/// What became of a task.
#[derive(Clone, Debug)]
pub enum TaskOutcome {
    /// Every pixel of the tile was computed.
    Completed(Task),
    /// The token was set; the tile may be partly written.
    Canceled(Task),
}

impl TaskOutcome {
    /// The task, however it ended.
    pub fn task(&self) -> &Task {
        match self {
            TaskOutcome::Completed(t) | TaskOutcome::Canceled(t) => t,
        }
    }

    /// Did the task finish?
    pub fn is_completed(&self) -> bool {
        match self {
            TaskOutcome::Completed(_) => true,
            TaskOutcome::Canceled(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_one_flag() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(!other.is_canceled());
        token.cancel();
        assert!(other.is_canceled());
        token.cancel();
        assert!(token.is_canceled());
        assert!(token.same_as(&other));
        assert!(!token.same_as(&CancellationToken::new()));
    }
}
