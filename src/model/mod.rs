//! The clocked core model seam.
//!
//! A core model is an opaque, cycle-evaluated component. The bridge writes
//! its input pins, calls [`CoreModel::eval`] once per clock edge and samples
//! its output pins. Nothing about the core's internals is visible.

pub mod scripted;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::Port;

pub use scripted::{CoreResponse, ScriptedCore};

/// Multi-bit "on" encoding for the fetch-enable input.
pub const FETCH_ENABLE_ON: u8 = 0b0101;

/// Response-side input pins of one memory port.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInputs {
    /// Grant: a request presented now will be accepted
    pub gnt: bool,
    /// Response valid
    pub rvalid: bool,
    /// Response data
    pub rdata: u32,
    /// Response error
    pub err: bool,
}

/// Input pins driven by the bridge.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreInputs {
    /// Clock
    pub clk: bool,
    /// Active-low reset
    pub rst_n: bool,
    /// Active-low scan reset, held deasserted
    pub scan_rst_n: bool,
    /// Multi-bit fetch enable
    pub fetch_enable: u8,
    /// Reset vector base
    pub boot_addr: u32,
    /// Hart identifier
    pub hart_id: u32,
    /// Instruction port responses
    pub instr: PortInputs,
    /// Data port responses
    pub data: PortInputs,
}

impl CoreInputs {
    /// Response pins of `port`.
    pub fn port_mut(&mut self, port: Port) -> &mut PortInputs {
        match port {
            Port::Instr => &mut self.instr,
            Port::Data => &mut self.data,
        }
    }

    /// Response pins of `port`.
    pub fn port(&self, port: Port) -> &PortInputs {
        match port {
            Port::Instr => &self.instr,
            Port::Data => &self.data,
        }
    }
}

/// Output pins sampled by the bridge.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreOutputs {
    pub instr_req: bool,
    pub instr_addr: u32,
    pub data_req: bool,
    pub data_we: bool,
    /// Byte enables, one bit per byte lane
    pub data_be: u8,
    pub data_addr: u32,
    pub data_wdata: u32,
    pub alert_minor: bool,
    pub alert_major_internal: bool,
    pub alert_major_bus: bool,
    pub core_sleep: bool,
}

impl CoreOutputs {
    /// The first asserted alert, checked in severity order.
    pub fn asserted_alert(&self) -> Option<Alert> {
        if self.alert_major_bus {
            Some(Alert::MajorBus)
        } else if self.alert_major_internal {
            Some(Alert::MajorInternal)
        } else if self.alert_minor {
            Some(Alert::Minor)
        } else {
            None
        }
    }
}

/// Alert outputs of the core. Any asserted alert is fatal to the bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Alert {
    Minor,
    MajorInternal,
    MajorBus,
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alert::Minor => write!(f, "minor"),
            Alert::MajorInternal => write!(f, "major internal"),
            Alert::MajorBus => write!(f, "major bus"),
        }
    }
}

/// A cycle-evaluated core model.
pub trait CoreModel {
    /// Input pins, written by the bridge before each evaluation.
    fn inputs_mut(&mut self) -> &mut CoreInputs;

    /// Output pins as of the last evaluation.
    fn outputs(&self) -> &CoreOutputs;

    /// Evaluates the model against its current inputs.
    fn eval(&mut self);

    /// Called once when the cosimulation ends.
    fn finalize(&mut self) {}
}

impl<C: CoreModel + ?Sized> CoreModel for Box<C> {
    fn inputs_mut(&mut self) -> &mut CoreInputs {
        (**self).inputs_mut()
    }

    fn outputs(&self) -> &CoreOutputs {
        (**self).outputs()
    }

    fn eval(&mut self) {
        (**self).eval()
    }

    fn finalize(&mut self) {
        (**self).finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_priority() {
        let mut out = CoreOutputs::default();
        assert_eq!(out.asserted_alert(), None);

        out.alert_minor = true;
        assert_eq!(out.asserted_alert(), Some(Alert::Minor));

        out.alert_major_bus = true;
        assert_eq!(out.asserted_alert(), Some(Alert::MajorBus));
    }

    #[test]
    fn test_port_accessors() {
        let mut inputs = CoreInputs::default();
        inputs.port_mut(Port::Data).rdata = 7;
        assert_eq!(inputs.data.rdata, 7);
        assert_eq!(inputs.port(Port::Instr).rdata, 0);
    }
}
