//! Shared fixtures: a scriptable guest runtime and a recording host.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use nibble_machine::{Core, HookSet, Host, Machine, MachineConfig, ScriptError, ScriptRuntime};

/// What the host saw.
#[derive(Default)]
pub struct HostLog {
    pub errors: Vec<String>,
    pub traces: Vec<(String, u8)>,
    pub counter: u64,
}

pub struct RecordingHost(pub Rc<RefCell<HostLog>>);

impl Host for RecordingHost {
    fn counter(&self) -> u64 {
        self.0.borrow().counter
    }

    fn freq(&self) -> u64 {
        1000
    }

    fn error(&mut self, message: &str) {
        self.0.borrow_mut().errors.push(message.to_string());
    }

    fn trace(&mut self, message: &str, color: u8) {
        self.0.borrow_mut().traces.push((message.to_string(), color));
    }

    fn exit(&mut self) {}
}

pub type Events = Rc<RefCell<Vec<String>>>;
type CoreFn = Box<dyn FnMut(&mut Core)>;
type RowFn = Box<dyn FnMut(&mut Core, i32)>;

/// Guest runtime driven by closures that records every call it gets.
pub struct FakeRuntime {
    pub names: &'static [&'static str],
    pub comment: &'static str,
    pub hooks: HookSet,
    pub fail: Option<ScriptError>,
    pub events: Events,
    pub on_tick: Option<CoreFn>,
    pub on_scanline: Option<RowFn>,
    pub on_border: Option<RowFn>,
    pub on_overline: Option<CoreFn>,
}

impl FakeRuntime {
    pub fn new(names: &'static [&'static str], comment: &'static str, events: &Events) -> Self {
        Self {
            names,
            comment,
            hooks: HookSet::default(),
            fail: None,
            events: events.clone(),
            on_tick: None,
            on_scanline: None,
            on_border: None,
            on_overline: None,
        }
    }

    fn record(&self, event: impl Into<String>) {
        self.events.borrow_mut().push(event.into());
    }
}

impl ScriptRuntime for FakeRuntime {
    fn names(&self) -> &[&str] {
        self.names
    }

    fn single_comment(&self) -> &str {
        self.comment
    }

    fn init(&mut self, _core: &mut Core, _code: &str) -> Result<HookSet, ScriptError> {
        self.record(format!("init {}", self.names[0]));
        match &self.fail {
            Some(e) => Err(e.clone()),
            None => Ok(self.hooks),
        }
    }

    fn close(&mut self, _core: &mut Core) {
        self.record(format!("close {}", self.names[0]));
    }

    fn tick(&mut self, core: &mut Core) {
        self.record("tick");
        if let Some(f) = self.on_tick.as_mut() {
            f(core);
        }
    }

    fn scanline(&mut self, core: &mut Core, row: i32) {
        self.record(format!("scanline {row}"));
        if let Some(f) = self.on_scanline.as_mut() {
            f(core, row);
        }
    }

    fn border(&mut self, core: &mut Core, row: i32) {
        self.record(format!("border {row}"));
        if let Some(f) = self.on_border.as_mut() {
            f(core, row);
        }
    }

    fn overline(&mut self, core: &mut Core) {
        self.record("overline");
        if let Some(f) = self.on_overline.as_mut() {
            f(core);
        }
    }
}

pub fn machine() -> (Machine, Rc<RefCell<HostLog>>) {
    let log = Rc::new(RefCell::new(HostLog::default()));
    let m = Machine::new(MachineConfig::default(), Box::new(RecordingHost(log.clone())));
    (m, log)
}

pub fn events() -> Events {
    Rc::new(RefCell::new(Vec::new()))
}

/// Run one full frame.
pub fn frame(m: &mut Machine) {
    m.tick_start();
    m.tick();
    m.tick_end();
    m.synth();
    m.blit();
}
