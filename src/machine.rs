// Machine: one interpreter instance
//
// Owns every piece of mutable interpreter state: the symbol table, the
// heap, the function arena, the global frame, the data stack the
// dispatcher fulfills arguments on, the activation stack and the trap
// stack. Nothing is shared between machines; handles from one machine are
// meaningless in another.

use log::debug;

use crate::cell::{Binding, Cell, FrameId, FuncId, SeriesId, SymbolId, Word};
use crate::error::{build_error_frame, ErrorKind, Outcome, RuntimeResult, Unwind};
use crate::frame::Frame;
use crate::function::Function;
use crate::heap::{Heap, SeriesData};
use crate::symbol::SymbolTable;
use crate::trap::TrapPoint;

#[derive(Debug, Clone)]
pub struct MachineConfig {
    /// Hard ceiling on a single series' element count.
    pub series_capacity_limit: usize,
    /// Hard ceiling on live series across the instance.
    pub max_live_series: usize,
    /// Activation stack depth limit; exceeding it raises the preallocated
    /// stack-overflow error.
    pub max_call_depth: usize,
    /// Allocations between collection attempts.
    pub gc_threshold: usize,
    pub gc_enabled: bool,
}

impl Default for MachineConfig {
    fn default() -> Self {
        MachineConfig {
            series_capacity_limit: 1 << 20,
            max_live_series: 1 << 20,
            max_call_depth: 256,
            gc_threshold: 4096,
            gc_enabled: true,
        }
    }
}

/// One live function call. Args for native and user calls live on the data
/// stack at `args_base`; closures get a real frame instead.
pub struct Activation {
    pub func: FuncId,
    /// Unique per call; definitional return escapes carry it.
    pub serial: u64,
    /// The word the call was made through, for backtraces.
    pub label: Option<SymbolId>,
    pub args_base: usize,
    /// Present for closure calls only.
    pub frame: Option<FrameId>,
    /// Body guarded for the duration of the call (closure body copies).
    pub guarded_body: Option<SeriesId>,
}

/// What a top-level run hands back to the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostOutcome {
    Value(Cell),
    Error(FrameId),
    Halted,
}

pub struct Machine {
    pub config: MachineConfig,
    pub symbols: SymbolTable,
    pub heap: Heap,
    pub funcs: Vec<Function>,
    pub global: FrameId,
    /// Data stack: argument slots for native and user-function activations.
    pub ds: Vec<Cell>,
    pub calls: Vec<Activation>,
    pub traps: Vec<TrapPoint>,
    /// Polled once per evaluation step; converts to Unwind::Halt.
    pub halt_requested: bool,
    /// Fragment near the current evaluation position, for error frames.
    pub current_near: Cell,
    next_serial: u64,
    anon_sym: SymbolId,
    // Preallocated resource errors; raising them never allocates.
    oom_error: FrameId,
    series_too_large_error: FrameId,
    stack_overflow_error: FrameId,
}

impl Machine {
    pub fn new(config: MachineConfig) -> Machine {
        let mut symbols = SymbolTable::new();
        let mut heap = Heap::new(config.series_capacity_limit, config.max_live_series);

        let global_series = heap
            .alloc(SeriesData::Frame(Frame::new()))
            .expect("boot allocation failed");
        heap.manage(global_series);
        heap.guard(global_series);
        let global = FrameId(global_series.0);

        let oom_error = boot_error(&mut heap, &mut symbols, &ErrorKind::OutOfMemory);
        let series_too_large_error =
            boot_error(&mut heap, &mut symbols, &ErrorKind::SeriesTooLarge);
        let stack_overflow_error =
            boot_error(&mut heap, &mut symbols, &ErrorKind::StackOverflow);

        let anon_sym = symbols.intern("anonymous");

        let mut machine = Machine {
            config,
            symbols,
            heap,
            funcs: Vec::new(),
            global,
            ds: Vec::new(),
            calls: Vec::new(),
            traps: Vec::new(),
            halt_requested: false,
            current_near: Cell::None,
            next_serial: 0,
            anon_sym,
            oom_error,
            series_too_large_error,
            stack_overflow_error,
        };
        crate::stdlib::install(&mut machine);
        debug!(
            "machine booted: {} natives, {} symbols",
            machine.funcs.len(),
            machine.symbols.len()
        );
        machine
    }

    pub fn next_serial(&mut self) -> u64 {
        self.next_serial += 1;
        self.next_serial
    }

    // --- allocation, GC-aware and raising on failure ---

    pub fn alloc_cells(&mut self, cells: Vec<Cell>) -> RuntimeResult<SeriesId> {
        self.maybe_collect();
        self.heap
            .alloc(SeriesData::Cells(cells))
            .map_err(|e| self.raise(e.into()))
    }

    pub fn alloc_bytes(&mut self, bytes: Vec<u8>) -> RuntimeResult<SeriesId> {
        self.maybe_collect();
        self.heap
            .alloc(SeriesData::Bytes(bytes))
            .map_err(|e| self.raise(e.into()))
    }

    pub fn alloc_frame(&mut self, frame: Frame) -> RuntimeResult<FrameId> {
        self.maybe_collect();
        self.heap
            .alloc(SeriesData::Frame(frame))
            .map_err(|e| self.raise(e.into()))
            .map(|id| FrameId(id.0))
    }

    fn maybe_collect(&mut self) {
        if self.config.gc_enabled
            && self.heap.gc_disabled == 0
            && self.heap.allocs_since_gc >= self.config.gc_threshold
        {
            crate::gc::collect(self);
        }
    }

    // --- raising ---

    /// Reify a kind into an error frame and wrap it as an unwind. Resource
    /// exhaustion uses the preallocated frames and never allocates.
    pub fn raise(&mut self, kind: ErrorKind) -> Unwind {
        match kind {
            ErrorKind::OutOfMemory => return Unwind::Error(self.oom_error),
            ErrorKind::SeriesTooLarge => return Unwind::Error(self.series_too_large_error),
            ErrorKind::StackOverflow => return Unwind::Error(self.stack_overflow_error),
            _ => {}
        }
        let where_ = self.backtrace_block().unwrap_or(Cell::None);
        let near = self.current_near;
        match build_error_frame(&mut self.heap, &mut self.symbols, &kind, where_, near) {
            Ok(frame) => Unwind::Error(frame),
            Err(_) => Unwind::Error(self.oom_error),
        }
    }

    /// Labels of the live calls, innermost first, as a managed block of
    /// words.
    fn backtrace_block(&mut self) -> Option<Cell> {
        let mut cells = Vec::with_capacity(self.calls.len());
        for a in self.calls.iter().rev() {
            let sym = a
                .label
                .or(self.funcs[a.func.0 as usize].name)
                .unwrap_or(self.anon_sym);
            cells.push(Cell::Word(Word::unbound(sym)));
        }
        let id = self.heap.alloc(SeriesData::Cells(cells)).ok()?;
        self.heap.manage(id);
        Some(Cell::Block(id))
    }

    pub fn func(&self, id: FuncId) -> &Function {
        &self.funcs[id.0 as usize]
    }

    pub fn add_function(&mut self, f: Function) -> FuncId {
        let id = FuncId(self.funcs.len() as u32);
        self.funcs.push(f);
        id
    }

    /// Assemble a native from its spec block and define it in the global
    /// frame.
    pub fn register_native(
        &mut self,
        name: &str,
        spec: SeriesId,
        body: crate::function::NativeFn,
    ) -> Result<FuncId, ErrorKind> {
        self.register(name, spec, crate::function::FuncBody::Native(body))
    }

    /// Wrap a foreign function. Its args are marshalled out to flat data
    /// and the result marshalled back at each call.
    pub fn register_foreign(
        &mut self,
        name: &str,
        spec: SeriesId,
        body: crate::function::ForeignFn,
    ) -> Result<FuncId, ErrorKind> {
        self.register(name, spec, crate::function::FuncBody::Foreign(body))
    }

    fn register(
        &mut self,
        name: &str,
        spec: SeriesId,
        body: crate::function::FuncBody,
    ) -> Result<FuncId, ErrorKind> {
        let (params, flags) = crate::function::assemble_params(&self.heap, &self.symbols, spec)?;
        if !self.heap.is_managed(spec) {
            self.heap.manage(spec);
        }
        let sym = self.symbols.intern(name);
        let id = self.add_function(Function {
            name: Some(sym),
            params,
            flags,
            body,
            spec: Some(spec),
        });
        let global = self.global;
        self.frame_mut(global).define(sym, Cell::Func(id));
        Ok(id)
    }

    /// Prepare a top-level block: give every set-word a global slot, then
    /// deep-bind the block to the global frame.
    pub fn bind_to_global(&mut self, block: SeriesId) {
        let mut syms = Vec::new();
        crate::binding::collect_set_words(&self.heap, block, &mut syms);
        let global = self.global;
        for sym in syms {
            if self.frame(global).slot_of(sym).is_none() {
                self.frame_mut(global).define(sym, Cell::Unset);
            }
        }
        crate::binding::bind_frame_deep(&mut self.heap, block, global);
    }

    // --- frames ---

    pub fn frame(&self, id: FrameId) -> &Frame {
        match &self.heap.get(id.as_series()).data {
            SeriesData::Frame(f) => f,
            _ => panic!("frame handle does not name a frame"),
        }
    }

    pub fn frame_mut(&mut self, id: FrameId) -> &mut Frame {
        match &mut self.heap.get_mut(id.as_series()).data {
            SeriesData::Frame(f) => f,
            _ => panic!("frame handle does not name a frame"),
        }
    }

    /// Define a word in the global frame.
    pub fn set_global(&mut self, name: &str, value: Cell) {
        let sym = self.symbols.intern(name);
        self.frame_mut_global().define(sym, value);
    }

    fn frame_mut_global(&mut self) -> &mut Frame {
        let global = self.global;
        self.frame_mut(global)
    }

    // --- word resolution ---

    /// Fetch the value a bound word refers to.
    pub fn word_value(&self, w: &Word) -> Result<Cell, ErrorKind> {
        match w.binding {
            Binding::Unbound => Err(ErrorKind::UnboundWord(self.symbols.name(w.sym).to_string())),
            Binding::Direct { frame, slot } => Ok(self.frame(frame).get(slot)),
            Binding::Relative { func, slot } => {
                let a = self.innermost_activation(func).ok_or_else(|| {
                    ErrorKind::NotInCall(self.symbols.name(w.sym).to_string())
                })?;
                match a.frame {
                    Some(frame) => Ok(self.frame(frame).get(slot)),
                    None => Ok(self.ds[a.args_base + slot as usize]),
                }
            }
        }
    }

    /// Store through a bound word, honoring word locks and frame
    /// protection.
    pub fn set_word(&mut self, w: &Word, value: Cell) -> Result<(), ErrorKind> {
        match w.binding {
            Binding::Unbound => Err(ErrorKind::UnboundWord(self.symbols.name(w.sym).to_string())),
            Binding::Direct { frame, slot } => self.store_frame_slot(frame, slot, value),
            Binding::Relative { func, slot } => {
                let (frame, base) = {
                    let a = self.innermost_activation(func).ok_or_else(|| {
                        ErrorKind::NotInCall(self.symbols.name(w.sym).to_string())
                    })?;
                    (a.frame, a.args_base)
                };
                match frame {
                    Some(frame) => self.store_frame_slot(frame, slot, value),
                    None => {
                        self.ds[base + slot as usize] = value;
                        Ok(())
                    }
                }
            }
        }
    }

    fn store_frame_slot(&mut self, frame: FrameId, slot: u32, value: Cell) -> Result<(), ErrorKind> {
        if self.heap.get(frame.as_series()).is_protected() || self.frame(frame).is_locked(slot) {
            return Err(ErrorKind::Protected);
        }
        self.frame_mut(frame).set(slot, value);
        Ok(())
    }

    fn innermost_activation(&self, func: FuncId) -> Option<&Activation> {
        self.calls.iter().rev().find(|a| a.func == func)
    }

    // --- top-level run ---

    /// Evaluate a block at the top level. A base trap intercepts both
    /// colors, so the host always gets a plain outcome back.
    pub fn run(&mut self, block: SeriesId) -> HostOutcome {
        crate::trap::push_trap(self, true);
        match crate::evaluator::eval_block(self, block) {
            Ok(Outcome::Value(v)) => {
                // a halt requested by the last expression has not been
                // polled yet
                if self.halt_requested {
                    self.halt_requested = false;
                    crate::trap::recover(self);
                    return HostOutcome::Halted;
                }
                crate::trap::discard_trap(self);
                HostOutcome::Value(v)
            }
            Ok(Outcome::Thrown(_)) => {
                // a throw nothing caught is an error at the boundary
                let unwind = self.raise(ErrorKind::NoCatch);
                crate::trap::recover(self);
                match unwind {
                    Unwind::Error(frame) => HostOutcome::Error(frame),
                    Unwind::Halt => HostOutcome::Halted,
                }
            }
            Err(Unwind::Error(frame)) => {
                crate::trap::recover(self);
                HostOutcome::Error(frame)
            }
            Err(Unwind::Halt) => {
                crate::trap::recover(self);
                HostOutcome::Halted
            }
        }
    }

    /// Request a halt. The evaluator notices at its next step.
    pub fn request_halt(&mut self) {
        self.halt_requested = true;
    }
}

impl Default for Machine {
    fn default() -> Self {
        Machine::new(MachineConfig::default())
    }
}

fn boot_error(heap: &mut Heap, symbols: &mut SymbolTable, kind: &ErrorKind) -> FrameId {
    let frame = build_error_frame(heap, symbols, kind, Cell::None, Cell::None)
        .expect("boot allocation failed");
    heap.guard(frame.as_series());
    frame
}
