//! The matrix driver.
//!
//! [`BackendMatrixDriver`] walks every configured problem size and, for each
//! size, every runnable backend, invoking the test case once per matrix
//! cell. Cells are strictly sequential: a cell's [`RoleDataProvider`] is
//! torn down, releasing its allocations, before the next cell begins, so
//! device memory stays bounded across a sweep spanning many orders of
//! magnitude.
//!
//! Per size the backend order is: unified-shared, device-only, and managed
//! memory on the accelerator queue, then the host execution policies against
//! a plain host container.

use tracing::{debug, info};

use crate::error::Result;
use crate::kernel_id::{next_run_serial, KernelIdentity, KernelRegistry};
use crate::memory::Element;
use crate::provider::{InitSpec, RoleDataProvider};
use crate::queue::{OwnershipModel, SharedQueue};
use crate::check::RunStatus;

/// How a matrix cell executes the algorithm under test.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ExecutionPolicy {
    /// Sequential host execution.
    HostSeq,
    /// Parallel host execution.
    HostPar,
    /// Execution on the accelerator queue.
    Accelerator,
}

impl ExecutionPolicy {
    /// Short stable label for logs and kernel-identity discriminators.
    pub fn label(self) -> &'static str {
        match self {
            ExecutionPolicy::HostSeq => "host_seq",
            ExecutionPolicy::HostPar => "host_par",
            ExecutionPolicy::Accelerator => "device",
        }
    }
}

/// One (memory model, execution policy) pairing under test.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Backend {
    /// Memory-ownership model the provider was built with.
    pub model: OwnershipModel,
    /// How the algorithm under test executes.
    pub policy: ExecutionPolicy,
}

impl Backend {
    /// Discriminator label: the model name for accelerator cells, the
    /// policy name for host cells.
    pub fn label(&self) -> &'static str {
        match self.policy {
            ExecutionPolicy::Accelerator => self.model.label(),
            _ => self.policy.label(),
        }
    }
}

/// Size-sweep policy: exhaustive steps of one through `linear_limit`, then
/// geometric growth up to `max`.
///
/// Small sizes expose off-by-one and boundary bugs, large sizes expose
/// scaling bugs; the switch point keeps total time bounded.
#[derive(Clone, Copy, Debug)]
pub struct SweepConfig {
    /// First size to run (0 and 1 are both valid).
    pub min: usize,
    /// Largest size still stepped by one.
    pub linear_limit: usize,
    /// Geometric growth factor past `linear_limit`.
    pub growth: f64,
    /// Inclusive upper bound on the size.
    pub max: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        SweepConfig {
            min: 1,
            linear_limit: 16,
            growth: 3.1415,
            max: 100_000,
        }
    }
}

impl SweepConfig {
    /// Default sweep capped at `max`.
    pub fn up_to(max: usize) -> Self {
        SweepConfig {
            max,
            ..SweepConfig::default()
        }
    }

    /// Iterator over the sizes of this sweep.
    pub fn sizes(&self) -> SizeSweep {
        SizeSweep {
            next: (self.min <= self.max).then_some(self.min),
            config: *self,
        }
    }
}

/// Iterator produced by [`SweepConfig::sizes`].
pub struct SizeSweep {
    next: Option<usize>,
    config: SweepConfig,
}

impl Iterator for SizeSweep {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let current = self.next?;
        let following = if current <= self.config.linear_limit {
            current + 1
        } else {
            (self.config.growth * current as f64) as usize
        };
        self.next = (following <= self.config.max).then_some(following);
        Some(current)
    }
}

/// Everything a test case receives for one matrix cell.
pub struct CaseContext<'a, T: Element> {
    /// The cell's backend pairing.
    pub backend: Backend,
    /// Problem size for this cell.
    pub n: usize,
    /// Fresh identity for this cell; derive further for sub-calls.
    pub identity: KernelIdentity,
    /// The cell's role-indexed buffers.
    pub provider: &'a RoleDataProvider<T>,
    queue: Option<SharedQueue>,
}

impl<'a, T: Element> CaseContext<'a, T> {
    /// Staging adapter over the first `count` elements of `role`'s window.
    pub fn transfer(
        &self,
        role: crate::provider::MemoryRole,
        count: usize,
    ) -> crate::transfer::HostShadowTransfer<'a, T> {
        crate::transfer::HostShadowTransfer::new(self.provider, role, count)
    }

    /// Wait for enqueued accelerator work, surfacing deferred device
    /// faults. No-op for host cells.
    pub fn wait(&self) -> Result<()> {
        match &self.queue {
            Some(queue) => queue.wait(),
            None => Ok(()),
        }
    }
}

/// A test case drivable across the verification matrix.
///
/// The case body must not retain accelerator-side positions beyond its own
/// invocation, must leave every region in a well-defined state on return
/// (issue and wait on all device operations, or call
/// [`CaseContext::wait`]), and must report mismatches through the harness
/// assertion primitives.
pub trait MatrixCase<T: Element> {
    /// Stable case name; the root of every derived kernel identity.
    fn name(&self) -> &str;

    /// Number of logical buffers the case uses (1 to 4).
    fn roles(&self) -> usize;

    /// Role layouts for problem size `n`. The default gives every role
    /// `n` elements at the conventional offsets.
    fn layout(&self, n: usize) -> InitSpec {
        InitSpec::uniform(n, self.roles())
    }

    /// Per-work-group local memory the algorithm under test needs, in
    /// bytes. Accelerator cells exceeding the queue's limit are skipped.
    fn local_memory_required(&self, _n: usize) -> usize {
        0
    }

    /// Run one matrix cell.
    fn run(&mut self, cx: &mut CaseContext<'_, T>) -> Result<()>;
}

/// Drives a [`MatrixCase`] across sizes and backends.
pub struct BackendMatrixDriver {
    sweep: SweepConfig,
    queue: Option<SharedQueue>,
    host_policies: Vec<ExecutionPolicy>,
}

impl BackendMatrixDriver {
    /// Driver over the default sweep. `queue` is the accelerator to use for
    /// the queue-backed models; without one those cells are skipped.
    pub fn new(queue: Option<SharedQueue>) -> Self {
        BackendMatrixDriver {
            sweep: SweepConfig::default(),
            queue,
            host_policies: vec![ExecutionPolicy::HostSeq, ExecutionPolicy::HostPar],
        }
    }

    /// Replace the size sweep.
    pub fn with_sweep(mut self, sweep: SweepConfig) -> Self {
        self.sweep = sweep;
        self
    }

    /// Replace the host policies run against the host container. An empty
    /// list restricts the run to accelerator cells.
    pub fn with_host_policies(mut self, policies: Vec<ExecutionPolicy>) -> Self {
        self.host_policies = policies;
        self
    }

    /// Run `case` over the full matrix.
    ///
    /// Fail-fast: the first failed check aborts the run. Unsupported
    /// backends skip their cells; if nothing at all ran the result is
    /// [`RunStatus::Skipped`].
    pub fn run_case<T: Element, C: MatrixCase<T> + ?Sized>(
        &self,
        case: &mut C,
    ) -> Result<RunStatus> {
        let registry = KernelRegistry::new();
        let base = KernelIdentity::new(case.name()).derive(next_run_serial());
        info!(case = case.name(), max_n = self.sweep.max, "running verification matrix");

        let mut ran = 0usize;
        let mut skipped = 0usize;

        for n in self.sweep.sizes() {
            debug!("n = {n}");

            for model in OwnershipModel::queue_models() {
                match self.runnable_queue(case, model, n) {
                    Some(queue) => {
                        let backend = Backend {
                            model,
                            policy: ExecutionPolicy::Accelerator,
                        };
                        self.run_cell(case, backend, n, Some(queue), &base, &registry)?;
                        ran += 1;
                    }
                    None => skipped += 1,
                }
            }

            for &policy in &self.host_policies {
                let backend = Backend {
                    model: OwnershipModel::HostContainer,
                    policy,
                };
                self.run_cell(case, backend, n, None, &base, &registry)?;
                ran += 1;
            }
        }

        info!(
            case = case.name(),
            cells = ran,
            skipped,
            "verification matrix finished"
        );
        if ran == 0 {
            Ok(RunStatus::Skipped)
        } else {
            Ok(RunStatus::Passed)
        }
    }

    /// The accelerator queue, if it can run `case` under `model` at size
    /// `n`.
    fn runnable_queue<T: Element, C: MatrixCase<T> + ?Sized>(
        &self,
        case: &C,
        model: OwnershipModel,
        n: usize,
    ) -> Option<SharedQueue> {
        let queue = self.queue.as_ref()?;
        if !queue.supports(model) {
            debug!(model = model.label(), "model unsupported, skipping cell");
            return None;
        }
        if case.local_memory_required(n) > queue.local_memory_limit() {
            debug!(
                model = model.label(),
                n, "local memory requirement exceeds device limit, skipping cell"
            );
            return None;
        }
        Some(queue.clone())
    }

    fn run_cell<T: Element, C: MatrixCase<T> + ?Sized>(
        &self,
        case: &mut C,
        backend: Backend,
        n: usize,
        queue: Option<SharedQueue>,
        base: &KernelIdentity,
        registry: &KernelRegistry,
    ) -> Result<()> {
        let spec = case.layout(n);
        let provider = RoleDataProvider::<T>::new(&spec, backend.model, queue.as_ref())?;

        let identity = base.derive(backend.label()).derive(n);
        registry.register(&identity)?;

        {
            let mut cx = CaseContext {
                backend,
                n,
                identity,
                provider: &provider,
                queue: queue.clone(),
            };
            case.run(&mut cx)?;
        }

        // Surface any fault the case left pending before the provider (and
        // its allocations) goes away.
        if let Some(queue) = &queue {
            queue.wait()?;
        }
        drop(provider);
        Ok(())
    }
}
