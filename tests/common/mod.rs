//! Helpers shared by the integration tests.

#![allow(dead_code)]

use membridge::{BridgeConfig, BridgeConfigBuilder, CoreInputs, CoreModel, CoreOutputs};

/// A core whose output pins are set directly by the test.
///
/// Every rising-edge evaluation out of reset records a snapshot of the input pins,
/// so tests can check what the core would have sampled.
#[derive(Debug, Default)]
pub struct PinCore {
    pub inputs: CoreInputs,
    pub outputs: CoreOutputs,
    pub sampled: Vec<CoreInputs>,
    pub finalized: bool,
}

impl PinCore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetching(addr: u32) -> Self {
        let mut core = Self::new();
        core.fetch(addr);
        core
    }

    pub fn storing(addr: u32, wdata: u32, be: u8) -> Self {
        let mut core = Self::new();
        core.store(addr, wdata, be);
        core
    }

    pub fn fetch(&mut self, addr: u32) {
        self.outputs.instr_req = true;
        self.outputs.instr_addr = addr;
    }

    pub fn load(&mut self, addr: u32) {
        self.outputs.data_req = true;
        self.outputs.data_we = false;
        self.outputs.data_be = 0b1111;
        self.outputs.data_addr = addr;
    }

    pub fn store(&mut self, addr: u32, wdata: u32, be: u8) {
        self.outputs.data_req = true;
        self.outputs.data_we = true;
        self.outputs.data_be = be;
        self.outputs.data_addr = addr;
        self.outputs.data_wdata = wdata;
    }

    pub fn idle(&mut self) {
        self.outputs.instr_req = false;
        self.outputs.data_req = false;
    }

    /// Input pins at the most recent rising edge.
    pub fn last_sample(&self) -> &CoreInputs {
        self.sampled.last().expect("no rising edge sampled yet")
    }
}

impl CoreModel for PinCore {
    fn inputs_mut(&mut self) -> &mut CoreInputs {
        &mut self.inputs
    }

    fn outputs(&self) -> &CoreOutputs {
        &self.outputs
    }

    fn eval(&mut self) {
        // The bridge evaluates with the clock high exactly once per tick.
        if self.inputs.clk && self.inputs.rst_n {
            self.sampled.push(self.inputs.clone());
        }
    }

    fn finalize(&mut self) {
        self.finalized = true;
    }
}

/// Default timing with one poll per tick.
pub fn unsynced() -> BridgeConfig {
    BridgeConfigBuilder::new().sync(false).build().unwrap()
}
