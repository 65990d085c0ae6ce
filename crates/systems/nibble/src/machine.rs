//! The console: RAM and state ([`Core`]) plus the runtime registry and the
//! frame pump ([`Machine`]).
//!
//! # Frame sequence
//!
//! The host writes input with [`Machine::set_input`], then calls
//! [`Machine::tick_start`], [`Machine::tick`], [`Machine::tick_end`],
//! [`Machine::synth`] and [`Machine::blit`]. [`nibble_core::System::step_frame`]
//! runs the same sequence.
//!
//! # Lifecycle
//!
//! A machine starts `Unloaded`. Loading a cart moves it to `Initializing`; the
//! next tick selects a runtime and initializes the program. Success moves to
//! `Running`. A failure is reported once through [`Host::error`] and the cart is
//! left rejected until another cart is loaded.

use nibble_core::logging::{log, LogCategory, LogLevel};
use nibble_core::palette::PALETTE_BYTES;
use nibble_core::types::{AudioSample, Frame};
use nibble_core::System;

use crate::cart::{Cart, BANKS};
use crate::config::MachineConfig;
use crate::draw::{Canvas, ClipRect};
use crate::host::{ClockHost, Host};
use crate::input::{InputCaps, InputState, Mouse, RawInput};
use crate::memory::{layout, Bits, Ram, DEFAULT_PALETTE_MAP, FULL_HEIGHT, FULL_WIDTH, VRAM_SIZE};
use crate::raster::{self, RasterHooks};
use crate::script::{self, HookSet, ScriptRegistry, ScriptRuntime};
use crate::sound::{SoundState, Synth};
use crate::sync::{self, SyncMask};
use crate::{LoadError, SystemError};

/// Lifecycle phase of the loaded program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unloaded,
    Initializing,
    Running,
}

/// The second VRAM bank, swapped in and out of RAM by `vbank`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VBank {
    pub id: u8,
    stash: Vec<u8>,
}

impl VBank {
    fn new() -> Self {
        Self {
            id: 0,
            stash: vec![0; VRAM_SIZE],
        }
    }
}

/// Everything besides RAM that a pause snapshot restores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreState {
    pub phase: Phase,
    /// The loaded cart failed to initialize.
    pub rejected: bool,
    /// Registry index of the bound runtime.
    pub runtime: Option<usize>,
    pub hooks: HookSet,
    pub caps: InputCaps,
    pub input: InputState,
    pub sound: SoundState,
    /// Sections synced since the last tick start.
    pub synced: SyncMask,
    pub vbank: VBank,
    pub clip: ClipRect,
    /// Palette used by the overlay pass.
    pub ovr_palette: [u8; PALETTE_BYTES],
}

impl CoreState {
    fn new() -> Self {
        Self {
            phase: Phase::Unloaded,
            rejected: false,
            runtime: None,
            hooks: HookSet::default(),
            caps: InputCaps::ALL,
            input: InputState::new(),
            sound: SoundState::new(),
            synced: SyncMask::NONE,
            vbank: VBank::new(),
            clip: ClipRect::FULL,
            ovr_palette: [0; PALETTE_BYTES],
        }
    }
}

/// Console hardware as seen by guest programs.
pub struct Core {
    pub ram: Ram,
    pub cart: Cart,
    pub(crate) state: CoreState,
    pub(crate) host: Box<dyn Host>,
    pub(crate) config: MachineConfig,
    /// Host counter value that `time()` counts from.
    start: u64,
    save_id: String,
}

impl Core {
    fn new(config: MachineConfig, host: Box<dyn Host>) -> Self {
        let mut core = Self {
            ram: Ram::new(),
            cart: Cart::new(),
            state: CoreState::new(),
            host,
            config,
            start: 0,
            save_id: String::new(),
        };
        core.reset();
        core
    }

    pub fn state(&self) -> &CoreState {
        &self.state
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn save_id(&self) -> &str {
        &self.save_id
    }

    /// Restore display registers, clip and sound, and rerun the program's
    /// initialization on the next tick. A rejected cart stays rejected.
    pub fn reset(&mut self) {
        self.ram
            .region_mut(layout::PALETTE)
            .copy_from_slice(&self.cart.bank(0).palette);
        self.ram
            .region_mut(layout::PALETTE_MAP)
            .copy_from_slice(&DEFAULT_PALETTE_MAP);
        for region in [layout::BORDER, layout::OFFSET, layout::CURSOR] {
            self.ram.region_mut(region).fill(0);
        }
        self.ram.region_mut(layout::BLIT_SEGMENT)[0] = 2;
        self.state.clip = ClipRect::FULL;
        self.state.sound.reset(&mut self.ram);
        self.state.hooks = HookSet::default();
        if self.state.phase != Phase::Unloaded {
            self.state.phase = Phase::Initializing;
        }
    }

    pub fn peek(&self, addr: i64, bits: Bits) -> u8 {
        self.ram.peek(addr, bits)
    }

    pub fn poke(&mut self, addr: i64, value: u8, bits: Bits) {
        self.ram.poke(addr, value, bits);
    }

    pub fn memcpy(&mut self, dst: i64, src: i64, size: i64) -> bool {
        self.ram.memcpy(dst, src, size)
    }

    pub fn memset(&mut self, dst: i64, value: u8, size: i64) -> bool {
        self.ram.memset(dst, value, size)
    }

    pub fn pmem(&mut self, index: i64, value: Option<u32>) -> u32 {
        self.ram.pmem(index, value)
    }

    /// Sync sections between bank `bank` and RAM. Returns the sections copied.
    ///
    /// # Panics
    ///
    /// Panics if `bank` is not a valid bank index.
    pub fn sync(&mut self, mask: SyncMask, bank: usize, to_cart: bool) -> SyncMask {
        sync::sync(
            &mut self.ram,
            &mut self.cart,
            &mut self.state.ovr_palette,
            &mut self.state.synced,
            mask,
            bank,
            to_cart,
        )
    }

    /// Switch VRAM bank and return the previous id. Ids other than 0 and 1
    /// only return the current id.
    pub fn vbank(&mut self, id: i64) -> u8 {
        let previous = self.state.vbank.id;
        if !(0..=1).contains(&id) || id as u8 == previous {
            return previous;
        }
        let vram = self.ram.region_mut(layout::VRAM);
        vram.swap_with_slice(&mut self.state.vbank.stash);
        self.state.vbank.id = id as u8;
        previous
    }

    fn input(&self) -> RawInput {
        RawInput::read_from(&self.ram)
    }

    pub fn btn(&self, id: i32) -> u32 {
        self.state.input.btn(&self.input(), id)
    }

    pub fn btnp(&self, id: i32, hold: i32, period: i32) -> u32 {
        self.state.input.btnp(&self.input(), id, hold, period)
    }

    pub fn key(&self, code: i32) -> bool {
        self.state.input.key(&self.input(), code)
    }

    pub fn keyp(&self, code: i32, hold: i32, period: i32) -> bool {
        self.state.input.keyp(&self.input(), code, hold, period)
    }

    /// Mouse state as stored in RAM, in full-frame coordinates.
    pub fn mouse(&self) -> Mouse {
        self.input().mouse
    }

    /// Milliseconds since the program started, paused time excluded.
    pub fn time(&self) -> f64 {
        let elapsed = self.host.counter().saturating_sub(self.start);
        elapsed as f64 * 1000.0 / self.host.freq().max(1) as f64
    }

    /// Seconds since the Unix epoch.
    pub fn tstamp(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    pub fn trace(&mut self, message: &str, color: u8) {
        self.host.trace(message, color);
    }

    pub fn exit(&mut self) {
        self.host.exit();
    }

    /// Drawing context over the screen with the current clip.
    pub fn canvas(&mut self) -> Canvas<'_> {
        Canvas::new(&mut self.ram, self.state.clip)
    }

    pub fn clip(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.state.clip = ClipRect::new(x, y, width, height);
    }

    pub fn reset_clip(&mut self) {
        self.state.clip = ClipRect::FULL;
    }

    #[allow(clippy::too_many_arguments)]
    pub fn sfx(
        &mut self,
        index: i32,
        note: i32,
        octave: i32,
        duration: i32,
        channel: i32,
        volume: (u8, u8),
        speed: i32,
    ) -> bool {
        self.state
            .sound
            .sfx(&mut self.ram, index, note, octave, duration, channel, volume, speed)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn music(
        &mut self,
        track: i32,
        frame: i32,
        row: i32,
        looped: bool,
        sustain: bool,
        tempo: i32,
        speed: i32,
    ) {
        self.state
            .sound
            .music(&mut self.ram, track, frame, row, looped, sustain, tempo, speed);
    }
}

/// State captured by [`Machine::pause`].
struct PauseSnapshot {
    state: CoreState,
    ram: Ram,
    start: u64,
    paused_at: u64,
}

/// Raster hooks of the bound runtime.
struct BoundHooks<'a> {
    runtime: Option<&'a mut (dyn ScriptRuntime + 'static)>,
    hooks: HookSet,
}

impl RasterHooks for BoundHooks<'_> {
    fn hooks(&self) -> HookSet {
        if self.runtime.is_some() {
            self.hooks
        } else {
            HookSet::default()
        }
    }

    fn scanline(&mut self, core: &mut Core, row: i32) {
        if let Some(rt) = self.runtime.as_deref_mut() {
            rt.scanline(core, row);
        }
    }

    fn border(&mut self, core: &mut Core, row: i32) {
        if let Some(rt) = self.runtime.as_deref_mut() {
            rt.border(core, row);
        }
    }

    fn overline(&mut self, core: &mut Core) {
        if let Some(rt) = self.runtime.as_deref_mut() {
            rt.overline(core);
        }
    }
}

/// A fantasy console instance.
pub struct Machine {
    core: Core,
    registry: ScriptRegistry,
    frame: Frame,
    synth: Synth,
    pause: Option<PauseSnapshot>,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new(MachineConfig::default(), Box::new(ClockHost::new()))
    }
}

impl Machine {
    pub fn new(config: MachineConfig, host: Box<dyn Host>) -> Self {
        let synth = Synth::new(config.sample_rate);
        Self {
            core: Core::new(config, host),
            registry: ScriptRegistry::new(),
            frame: Frame::new(FULL_WIDTH as u32, FULL_HEIGHT as u32),
            synth,
            pause: None,
        }
    }

    /// Add a guest runtime. The first registered runtime is the fallback for
    /// carts without a matching `script:` tag.
    pub fn register_runtime(&mut self, runtime: Box<dyn ScriptRuntime>) -> usize {
        self.registry.register(runtime)
    }

    pub fn registry(&self) -> &ScriptRegistry {
        &self.registry
    }

    pub fn core(&self) -> &Core {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut Core {
        &mut self.core
    }

    pub fn phase(&self) -> Phase {
        self.core.state.phase
    }

    /// Last blitted frame.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Replace the cart. The previous program is closed and the new one is
    /// initialized on the next tick.
    pub fn load_cart(&mut self, cart: Cart) {
        self.close_runtime();
        self.pause = None;
        self.core.cart = cart;
        self.core.state.phase = Phase::Initializing;
        self.core.state.rejected = false;
        let comment = self
            .registry
            .select(&self.core.cart.code)
            .and_then(|i| self.registry.get(i))
            .map(|rt| rt.single_comment().to_string())
            .unwrap_or_default();
        self.core.save_id = script::save_id(&self.core.cart.code, &comment);
        self.core.reset();
        log(LogCategory::Script, LogLevel::Info, || {
            format!(
                "cart loaded: {} bytes of code, saveid '{}'",
                self.core.cart.code.len(),
                self.core.save_id
            )
        });
    }

    /// Close the program and drop the cart.
    pub fn unload(&mut self) {
        self.close_runtime();
        self.pause = None;
        self.core.cart = Cart::new();
        self.core.state.phase = Phase::Unloaded;
        self.core.state.rejected = false;
        self.core.reset();
    }

    fn close_runtime(&mut self) {
        if let Some(index) = self.core.state.runtime.take() {
            if let Some(rt) = self.registry.get_mut(index) {
                rt.close(&mut self.core);
            }
        }
        self.core.state.hooks = HookSet::default();
    }

    /// Write this frame's device input into RAM.
    pub fn set_input(&mut self, input: &RawInput) {
        input.write_to(&mut self.core.ram);
    }

    /// Start a frame: advance sound, input hold counters and reset the sync
    /// accumulator.
    pub fn tick_start(&mut self) {
        let core = &mut self.core;
        core.state.sound.tick_start(&mut core.ram);
        let input = core.input();
        core.state.input.update_holds(&input);
        core.state.synced = SyncMask::NONE;
    }

    /// Run one frame of the program, initializing it first if needed.
    pub fn tick(&mut self) {
        match self.core.state.phase {
            Phase::Unloaded => return,
            Phase::Initializing => {
                if self.core.state.rejected {
                    return;
                }
                if let Err(e) = self.initialize() {
                    let message = e.to_string();
                    log(LogCategory::Script, LogLevel::Error, || {
                        format!("cart rejected: {message}")
                    });
                    self.core.host.error(&message);
                    self.core.state.rejected = true;
                    return;
                }
            }
            Phase::Running => {}
        }

        let Some(index) = self.core.state.runtime else {
            return;
        };
        let caps = self.core.state.caps;
        caps.mask(&mut self.core.ram);
        if let Some(rt) = self.registry.get_mut(index) {
            rt.tick(&mut self.core);
        }
    }

    fn initialize(&mut self) -> Result<(), LoadError> {
        let code = self.core.cart.code.clone();
        if code.is_empty() {
            return Err(LoadError::EmptyCode);
        }
        let index = self.registry.select(&code).ok_or(LoadError::NoRuntime)?;

        // The runtime survives a guest reset; close it before starting again.
        self.close_runtime();

        let mask = sync::startup_mask(&self.core.cart);
        self.core.state.synced = SyncMask::NONE;
        self.core.sync(mask, 0, false);
        self.core.state.synced = SyncMask::NONE;

        let rt = self.registry.get_mut(index).ok_or(LoadError::NoRuntime)?;
        let tag = script::metatag(&code, "input", rt.single_comment());
        let caps = InputCaps::from_tag(tag.as_deref());
        log(LogCategory::Input, LogLevel::Debug, || {
            format!("input tag {tag:?}: {caps:?}")
        });
        self.core.state.caps = caps;
        self.core.start = self.core.host.counter();

        let hooks = rt.init(&mut self.core, &code)?;
        self.core.state.runtime = Some(index);
        self.core.state.hooks = hooks;
        self.core.state.phase = Phase::Running;
        log(LogCategory::Script, LogLevel::Info, || {
            format!("program started with runtime {index}: {hooks:?}")
        });
        Ok(())
    }

    /// Finish a frame: remember input for edge detection and queue the sound
    /// registers.
    pub fn tick_end(&mut self) {
        let core = &mut self.core;
        let input = core.input();
        core.state.input.snapshot(&input);
        core.state.sound.tick_end(&core.ram);
    }

    /// Render one frame of audio from the queued registers.
    pub fn synth(&mut self) -> &[AudioSample] {
        self.synth.render(&mut self.core.state.sound.ring)
    }

    /// Compose the output frame, running the bound raster hooks.
    pub fn blit(&mut self) -> &Frame {
        let running = self.core.state.phase == Phase::Running;
        let runtime = self
            .core
            .state
            .runtime
            .filter(|_| running)
            .and_then(|i| self.registry.get_mut(i));
        let mut hooks = BoundHooks {
            runtime,
            hooks: self.core.state.hooks,
        };
        raster::blit(&mut self.core, &mut hooks, &mut self.frame);
        &self.frame
    }

    /// Run the program's menu handler, if it has one.
    pub fn menu(&mut self, index: i32) {
        if self.core.state.phase != Phase::Running || !self.core.state.hooks.menu {
            return;
        }
        if let Some(rt) = self.core.state.runtime.and_then(|i| self.registry.get_mut(i)) {
            rt.menu(&mut self.core, index);
        }
    }

    /// Evaluate a snippet in the running program.
    pub fn eval(&mut self, code: &str) {
        if self.core.state.phase != Phase::Running {
            return;
        }
        if let Some(rt) = self.core.state.runtime.and_then(|i| self.registry.get_mut(i)) {
            rt.eval(&mut self.core, code);
        }
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_some()
    }

    /// Snapshot state and RAM. Pausing twice keeps the first snapshot.
    pub fn pause(&mut self) {
        if self.pause.is_some() {
            return;
        }
        self.pause = Some(PauseSnapshot {
            state: self.core.state.clone(),
            ram: self.core.ram.clone(),
            start: self.core.start,
            paused_at: self.core.host.counter(),
        });
        self.core.state.ovr_palette = [0; PALETTE_BYTES];
        log(LogCategory::Script, LogLevel::Debug, || "paused".to_string());
    }

    /// Restore the pause snapshot and shift the time base past the pause.
    pub fn resume(&mut self) {
        let Some(snapshot) = self.pause.take() else {
            return;
        };
        let now = self.core.host.counter();
        self.core.state = snapshot.state;
        self.core.ram = snapshot.ram;
        self.core.start = snapshot.start + now.saturating_sub(snapshot.paused_at);
        log(LogCategory::Script, LogLevel::Debug, || "resumed".to_string());
    }
}

impl System for Machine {
    type Error = SystemError;

    fn reset(&mut self) {
        self.core.reset();
    }

    fn step_frame(&mut self) -> Result<Frame, Self::Error> {
        if self.core.state.phase == Phase::Unloaded {
            return Err(SystemError::NoCart);
        }
        self.tick_start();
        self.tick();
        self.tick_end();
        self.synth();
        Ok(self.blit().clone())
    }

    fn save_state(&self) -> serde_json::Value {
        let persistent: Vec<u32> = (0..crate::memory::PMEM_SLOTS)
            .map(|i| self.core.ram.read_u32(layout::PERSISTENT.offset + i * 4))
            .collect();
        serde_json::json!({
            "system": "nibble",
            "version": 1,
            "saveid": self.core.save_id,
            "persistent": persistent,
        })
    }

    fn load_state(&mut self, v: &serde_json::Value) -> Result<(), serde_json::Error> {
        if let Some(p) = v.get("persistent") {
            let slots: Vec<u32> = serde_json::from_value(p.clone())?;
            for (i, value) in slots.into_iter().enumerate() {
                self.core.pmem(i as i64, Some(value));
            }
        }
        Ok(())
    }

    fn supports_save_states(&self) -> bool {
        true
    }
}

/// Bank index from a guest value, if it names a bank.
pub(crate) fn valid_bank(bank: i64) -> Option<usize> {
    (0..BANKS as i64).contains(&bank).then_some(bank as usize)
}
