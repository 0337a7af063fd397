//! Simulated device backed by host memory.
//!
//! Kernels are not executed: a launch validates its arguments, advances the
//! device clock by the cost model's estimate, and returns the interval as an
//! [`Event`]. This makes search behavior fully deterministic, which is what
//! tests and demos of the autotuner need.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use bon::bon;
use snafu::{OptionExt, ensure};
use tracing::trace;

use crate::allocator::Allocator;
use crate::buffer::{Buffer, BufferId};
use crate::device::{Compiler, Device, Event, Program};
use crate::error::*;
use crate::launch::LaunchShape;

/// Ticks a kernel takes given its source and launch shape; `None` fails the launch.
pub type CostModel = Rc<dyn Fn(&str, &LaunchShape) -> Option<u64>>;

/// Returns `true` for sources the compiler should reject.
pub type CompileFilter = Rc<dyn Fn(&str) -> bool>;

struct SimState {
    memory: RefCell<HashMap<BufferId, Vec<f32>>>,
    clock: Cell<u64>,
    pending: Cell<usize>,
    launches: Cell<usize>,
    compiled: RefCell<Vec<(String, String)>>,
    cost: CostModel,
    reject: Option<CompileFilter>,
    timing_scale: f64,
}

/// Host-memory device with a pluggable cost model.
///
/// Cloning shares memory, clock and statistics.
#[derive(Clone)]
pub struct SimDevice {
    state: Rc<SimState>,
}

#[bon]
impl SimDevice {
    /// Create a simulated device.
    ///
    /// Without a cost model every launch costs one tick per byte of source.
    #[builder]
    pub fn new(cost: Option<CostModel>, reject: Option<CompileFilter>, #[builder(default = 1.0)] timing_scale: f64) -> Self {
        let cost: CostModel = match cost {
            Some(cost) => cost,
            None => Rc::new(|src: &str, _: &LaunchShape| Some(src.len() as u64)),
        };
        Self {
            state: Rc::new(SimState {
                memory: RefCell::default(),
                clock: Cell::new(0),
                pending: Cell::new(0),
                launches: Cell::new(0),
                compiled: RefCell::default(),
                cost,
                reject,
                timing_scale,
            }),
        }
    }
}

impl SimDevice {
    pub fn with_cost(cost: impl Fn(&str, &LaunchShape) -> Option<u64> + 'static) -> Self {
        Self::builder().cost(Rc::new(cost)).build()
    }

    /// Number of launches so far.
    pub fn launches(&self) -> usize {
        self.state.launches.get()
    }

    /// Launches enqueued since the last [`Device::synchronize`].
    pub fn pending(&self) -> usize {
        self.state.pending.get()
    }

    /// `(name, source)` of every compiled kernel, in order.
    pub fn compiled(&self) -> Vec<(String, String)> {
        self.state.compiled.borrow().clone()
    }
}

impl Default for SimDevice {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for SimDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimDevice")
            .field("buffers", &self.state.memory.borrow().len())
            .field("clock", &self.state.clock.get())
            .field("launches", &self.state.launches.get())
            .finish()
    }
}

impl Allocator for SimDevice {
    fn alloc(&self, len: usize) -> Result<Buffer> {
        let buffer = Buffer::new(len);
        self.state.memory.borrow_mut().insert(buffer.id(), vec![0.0; len]);
        Ok(buffer)
    }

    fn copy_in(&self, buffer: &Buffer, data: &[f32]) -> Result<()> {
        let mut memory = self.state.memory.borrow_mut();
        let slot = memory.get_mut(&buffer.id()).context(UnknownBufferSnafu { id: buffer.id() })?;
        ensure!(slot.len() == data.len(), SizeMismatchSnafu { expected: slot.len(), actual: data.len() });
        slot.copy_from_slice(data);
        Ok(())
    }

    fn copy_out(&self, buffer: &Buffer, out: &mut [f32]) -> Result<()> {
        let memory = self.state.memory.borrow();
        let slot = memory.get(&buffer.id()).context(UnknownBufferSnafu { id: buffer.id() })?;
        ensure!(slot.len() == out.len(), SizeMismatchSnafu { expected: slot.len(), actual: out.len() });
        out.copy_from_slice(slot);
        Ok(())
    }
}

impl Compiler for SimDevice {
    fn compile(&self, name: &str, src: &str) -> Result<Box<dyn Program>> {
        if let Some(reject) = &self.state.reject
            && reject(src)
        {
            return CompileSnafu { name, reason: "rejected by compile filter" }.fail();
        }
        self.state.compiled.borrow_mut().push((name.to_string(), src.to_string()));
        Ok(Box::new(SimProgram { name: name.to_string(), src: src.to_string(), state: Rc::clone(&self.state) }))
    }
}

impl Device for SimDevice {
    fn name(&self) -> &str {
        "SIM"
    }

    fn synchronize(&self) -> Result<()> {
        self.state.pending.set(0);
        Ok(())
    }

    fn timing_scale(&self) -> f64 {
        self.state.timing_scale
    }
}

struct SimProgram {
    name: String,
    src: String,
    state: Rc<SimState>,
}

impl Program for SimProgram {
    fn launch(&self, shape: &LaunchShape, buffers: &[Buffer]) -> Result<Event> {
        {
            let memory = self.state.memory.borrow();
            for buffer in buffers {
                ensure!(memory.contains_key(&buffer.id()), UnknownBufferSnafu { id: buffer.id() });
            }
        }
        let ticks = (self.state.cost)(&self.src, shape)
            .context(ExecutionSnafu { name: &self.name, reason: "launch failed in cost model" })?;

        let start = self.state.clock.get();
        let end = start + ticks;
        self.state.clock.set(end);
        self.state.pending.set(self.state.pending.get() + 1);
        self.state.launches.set(self.state.launches.get() + 1);
        trace!(name = %self.name, global = ?shape.global_size, ticks, "sim launch");
        Ok(Event { start, end })
    }

    fn name(&self) -> &str {
        &self.name
    }
}
