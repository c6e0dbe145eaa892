// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The generator engine: runs an escape function over every pixel of
//! each task, in order, writing straight into the raster of the whole
//! view.  Tasks report how they ended as `TaskOutcome` values instead
//! of through callbacks; a `Run` yields one outcome per task as soon as
//! that task is done, and stops after the first cancellation.

use log::{debug, trace};
use std::vec;

use crate::escape::EscapeFunction;
use crate::raster::Raster;
use crate::task::{Task, TaskOutcome};

/// Holds the escape function for a series of invocations.
#[derive(Clone, Debug)]
pub struct Generator<F> {
    function: F,
}

impl<F: EscapeFunction> Generator<F> {
    /// Constructor.
    pub fn new(function: F) -> Generator<F> {
        Generator { function }
    }

    /// Starts an invocation over `tasks`.  Nothing is computed until the
    /// returned `Run` is advanced.
    pub fn run<'a>(&'a self, tasks: Vec<Task>, raster: &'a mut Raster) -> Run<'a, F> {
        Run {
            function: &self.function,
            tasks: tasks.into_iter(),
            raster,
            stopped: false,
        }
    }

    /// Computes every task, or every task up to and including the first
    /// one canceled, and returns their outcomes in order.
    pub fn invoke(&self, tasks: Vec<Task>, raster: &mut Raster) -> Vec<TaskOutcome> {
        self.run(tasks, raster).collect()
    }
}

/// One invocation in progress.  Each call to `next` computes one task.
pub struct Run<'a, F> {
    function: &'a F,
    tasks: vec::IntoIter<Task>,
    raster: &'a mut Raster,
    stopped: bool,
}

impl<'a, F> Run<'a, F> {
    /// The raster as it stands between tasks.
    pub fn raster(&self) -> &Raster {
        &*self.raster
    }
}

impl<'a, F: EscapeFunction> Iterator for Run<'a, F> {
    type Item = TaskOutcome;

    fn next(&mut self) -> Option<TaskOutcome> {
        if self.stopped {
            return None;
        }
        let task = self.tasks.next()?;
        let outcome = compute(self.function, task, self.raster);
        if !outcome.is_completed() {
            debug!(
                "job {} canceled at tile {:?}; {} tasks dropped",
                outcome.task().identifier,
                outcome.task().tile_pixel_view,
                self.tasks.len()
            );
            self.stopped = true;
        }
        Some(outcome)
    }
}

/// Every pixel of one tile, column by column.  The token is polled
/// before the first pixel and after each one.
fn compute<F: EscapeFunction>(function: &F, task: Task, raster: &mut Raster) -> TaskOutcome {
    let token = &task.cancellation_token;
    if token.is_canceled() {
        return TaskOutcome::Canceled(task);
    }
    let view = task.fractal_view;
    let (real_factor, imaginary_factor) = view.factors();
    trace!("job {} computing {:?}", task.identifier, task.tile_pixel_view);

    for column in task.tile_pixel_view.columns() {
        for row in task.tile_pixel_view.rows() {
            let point = view.point_with(real_factor, imaginary_factor, column, row);
            raster.set(column, row, function.evaluate(point, token));
            if token.is_canceled() {
                return TaskOutcome::Canceled(task);
            }
        }
    }
    TaskOutcome::Completed(task)
}
