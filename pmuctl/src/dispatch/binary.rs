//! Binary command (ioctl) protocol.
//!
//! Commands are `_IOC` numbers in the `0xF1` group mapping 1:1 onto registry
//! ids. The caller buffer is validated for size and direction before it is
//! read or written, and before any register is touched.

use super::Dispatcher;
use pmuctl_common::consts::PM_CTL_CNT;
use pmuctl_common::error::PmuError;
use pmuctl_common::ioctl::{
    Access, IoctlCommand, PAYLOAD_SIZE, PMUCTL_IOC_MAGIC, PmuctlToggle, SET_COMMANDS, ioc_type,
};
use static_assertions::const_assert_eq;
use tracing::debug;

// Every registry entry has exactly one set command.
const_assert_eq!(SET_COMMANDS.len(), PM_CTL_CNT);

/// Caller memory handed to an ioctl, with the access the caller granted.
///
/// This is the user-space stand-in for a `__user` pointer checked with
/// `access_ok`.
#[derive(Debug)]
pub struct UserSlice<'a> {
    bytes: &'a mut [u8],
    access: Access,
}

impl<'a> UserSlice<'a> {
    /// Wrap `bytes` with the given access.
    pub fn new(bytes: &'a mut [u8], access: Access) -> Self {
        Self { bytes, access }
    }

    /// Buffer the handler may only read.
    pub fn readable(bytes: &'a mut [u8]) -> Self {
        Self::new(bytes, Access::READ)
    }

    /// Buffer the handler may only write.
    pub fn writable(bytes: &'a mut [u8]) -> Self {
        Self::new(bytes, Access::WRITE)
    }

    /// Buffer the handler may read and write.
    pub fn read_write(bytes: &'a mut [u8]) -> Self {
        Self::new(bytes, Access::all())
    }

    /// Length of the buffer in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True for an empty buffer.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Check size and access before the buffer is used.
    fn check(&self, size: usize, required: Access) -> Result<(), PmuError> {
        if self.bytes.len() != size || !self.access.contains(required) {
            return Err(PmuError::BadAccess {
                expected: size,
                required: required.describe(),
            });
        }
        Ok(())
    }

    fn copy_in(&self) -> Result<PmuctlToggle, PmuError> {
        self.check(PAYLOAD_SIZE, Access::READ)?;
        let mut raw = [0u8; PAYLOAD_SIZE];
        raw.copy_from_slice(&self.bytes[..]);
        Ok(PmuctlToggle::from_bytes(raw))
    }

    fn copy_out(&mut self, payload: PmuctlToggle) -> Result<(), PmuError> {
        self.check(PAYLOAD_SIZE, Access::WRITE)?;
        self.bytes.copy_from_slice(&payload.to_bytes());
        Ok(())
    }
}

/// Resolve a command number.
///
/// Numbers outside the pmuctl group are `UnknownCommand`; numbers inside it
/// that no handler serves are `UnsupportedCommand`.
pub fn decode_command(code: u32) -> Result<IoctlCommand, PmuError> {
    if ioc_type(code) != PMUCTL_IOC_MAGIC {
        return Err(PmuError::UnknownCommand(code));
    }
    IoctlCommand::from_code(code).ok_or(PmuError::UnsupportedCommand(code))
}

impl<const N: usize> Dispatcher<N> {
    /// Handle one binary command.
    ///
    /// Set commands take `{ enable: 0 | 1 }` from a readable buffer; get
    /// commands store the current state into a writable buffer.
    pub fn ioctl(&self, code: u32, mut arg: UserSlice<'_>) -> Result<(), PmuError> {
        let cmd = decode_command(code)?;
        let desc = self
            .registry
            .lookup_by_id(cmd.control().index())
            .ok_or(PmuError::UnknownCommand(code))?;

        arg.check(cmd.payload_size(), cmd.access())?;
        debug!("ioctl {:?} on {}", cmd, desc.name());

        match cmd {
            IoctlCommand::Set(_) => {
                if !desc.can_modify() {
                    return Err(PmuError::NotModifiable(desc.name().to_string()));
                }
                let enable = match arg.copy_in()?.enable {
                    0 => false,
                    1 => true,
                    other => return Err(PmuError::InvalidValue(other.to_string())),
                };
                self.apply(desc, enable)
            }
            IoctlCommand::Get(_) => {
                let enabled = {
                    let _token = self.token.lock();
                    desc.show()
                }
                .ok_or(PmuError::UnsupportedCommand(code))?;
                arg.copy_out(PmuctlToggle::from_state(enabled))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::simulation::SimulatedMachine;
    use crate::broadcast::SingleCore;
    use crate::registry::ControlRegistry;
    use pmuctl_common::consts::ControlId;
    use crate::control::{BroadcastControl, Capabilities, ControlDescriptor};
    use pmuctl_common::ioctl::{
        PMU_IOC_CNTKCTL, PMU_IOC_CNTKCTL_GET, PMU_IOC_PMCCNTR, PMU_IOC_PMCCNTR_GET,
    };
    use std::sync::Arc;

    fn standard() -> (Arc<SimulatedMachine>, Dispatcher) {
        let machine = SimulatedMachine::new(1);
        let (registry, _) = ControlRegistry::standard(machine.registers(), Arc::new(SingleCore));
        (machine, Dispatcher::new(registry))
    }

    fn toggle(enable: i32) -> [u8; PAYLOAD_SIZE] {
        PmuctlToggle { enable }.to_bytes()
    }

    #[test]
    fn set_pmccntr() {
        let (machine, dispatcher) = standard();
        let mut buf = toggle(1);
        dispatcher
            .ioctl(PMU_IOC_PMCCNTR, UserSlice::readable(&mut buf))
            .unwrap();
        assert_eq!(machine.pmccntr_states(), vec![true]);
        assert_eq!(machine.cntkctl_states(), vec![false]);

        let mut buf = toggle(0);
        dispatcher
            .ioctl(PMU_IOC_PMCCNTR, UserSlice::read_write(&mut buf))
            .unwrap();
        assert_eq!(machine.pmccntr_states(), vec![false]);
    }

    #[test]
    fn get_reports_state() {
        let (_machine, dispatcher) = standard();
        dispatcher.set("CNTKCTL", true).unwrap();

        let mut buf = [0xAAu8; PAYLOAD_SIZE];
        dispatcher
            .ioctl(PMU_IOC_CNTKCTL_GET, UserSlice::writable(&mut buf))
            .unwrap();
        assert_eq!(PmuctlToggle::from_bytes(buf).enable, 1);

        dispatcher
            .ioctl(PMU_IOC_PMCCNTR_GET, UserSlice::writable(&mut buf))
            .unwrap();
        assert_eq!(PmuctlToggle::from_bytes(buf).enable, 0);
    }

    #[test]
    fn undersized_buffer_rejected_before_write() {
        let (machine, dispatcher) = standard();
        let mut buf = [1u8; PAYLOAD_SIZE - 1];
        let err = dispatcher
            .ioctl(PMU_IOC_PMCCNTR, UserSlice::readable(&mut buf))
            .unwrap_err();
        assert!(matches!(err, PmuError::BadAccess { expected: 4, .. }));
        assert_eq!(machine.write_counts(), vec![0]);
    }

    #[test]
    fn oversized_buffer_rejected() {
        let (machine, dispatcher) = standard();
        let mut buf = [0u8; PAYLOAD_SIZE + 4];
        buf[0] = 1;
        assert!(matches!(
            dispatcher.ioctl(PMU_IOC_PMCCNTR, UserSlice::readable(&mut buf)),
            Err(PmuError::BadAccess { .. })
        ));
        assert_eq!(machine.write_counts(), vec![0]);
    }

    #[test]
    fn set_needs_readable_buffer() {
        let (machine, dispatcher) = standard();
        let mut buf = toggle(1);
        let err = dispatcher
            .ioctl(PMU_IOC_PMCCNTR, UserSlice::writable(&mut buf))
            .unwrap_err();
        assert_eq!(
            err,
            PmuError::BadAccess {
                expected: PAYLOAD_SIZE,
                required: "read"
            }
        );
        assert_eq!(machine.write_counts(), vec![0]);
    }

    #[test]
    fn get_needs_writable_buffer() {
        let (_machine, dispatcher) = standard();
        let mut buf = [0x55u8; PAYLOAD_SIZE];
        let err = dispatcher
            .ioctl(PMU_IOC_PMCCNTR_GET, UserSlice::readable(&mut buf))
            .unwrap_err();
        assert_eq!(
            err,
            PmuError::BadAccess {
                expected: PAYLOAD_SIZE,
                required: "write"
            }
        );
        assert_eq!(buf, [0x55u8; PAYLOAD_SIZE]);
    }

    #[test]
    fn enable_must_be_zero_or_one() {
        let (machine, dispatcher) = standard();
        let mut buf = toggle(2);
        assert_eq!(
            dispatcher.ioctl(PMU_IOC_PMCCNTR, UserSlice::readable(&mut buf)),
            Err(PmuError::InvalidValue("2".to_string()))
        );
        assert_eq!(machine.write_counts(), vec![0]);
    }

    #[test]
    fn unknown_and_unsupported_commands() {
        let (_machine, dispatcher) = standard();
        let mut buf = toggle(1);

        // Another driver's group.
        let foreign = nix::request_code_write!(b'T', 0, PAYLOAD_SIZE) as u32;
        assert_eq!(
            dispatcher.ioctl(foreign, UserSlice::readable(&mut buf)),
            Err(PmuError::UnknownCommand(foreign))
        );

        // Our group, no such command number.
        let unhandled = nix::request_code_write!(PMUCTL_IOC_MAGIC, 0x7f, PAYLOAD_SIZE) as u32;
        assert_eq!(
            dispatcher.ioctl(unhandled, UserSlice::readable(&mut buf)),
            Err(PmuError::UnsupportedCommand(unhandled))
        );

        // Right number, wrong payload size encoded.
        let resized = nix::request_code_write!(PMUCTL_IOC_MAGIC, 0, 8) as u32;
        assert_eq!(
            decode_command(resized),
            Err(PmuError::UnsupportedCommand(resized))
        );
    }

    #[test]
    fn command_ids_follow_registry() {
        for id in ControlId::ALL {
            assert_eq!(decode_command(SET_COMMANDS[id.index()]), Ok(IoctlCommand::Set(id)));
        }
    }

    /// Registry whose first control can only be modified and second only shown.
    fn partial() -> (Arc<SimulatedMachine>, Dispatcher) {
        let machine = SimulatedMachine::new(1);
        let regs = machine.registers();
        let exec: Arc<dyn crate::broadcast::BroadcastExecutor> = Arc::new(SingleCore);
        let registry = ControlRegistry::new([
            ControlDescriptor::new(
                "HIDDEN",
                Arc::new(BroadcastControl::with_capabilities(
                    regs.pmccntr,
                    exec.clone(),
                    Capabilities::MODIFY,
                )),
            ),
            ControlDescriptor::new("RO", Arc::new(BroadcastControl::read_only(regs.cntkctl, exec))),
        ]);
        (machine, Dispatcher::new(registry))
    }

    #[test]
    fn set_on_read_only_control_rejected() {
        let (machine, dispatcher) = partial();
        let mut buf = toggle(1);
        assert_eq!(
            dispatcher.ioctl(PMU_IOC_CNTKCTL, UserSlice::readable(&mut buf)),
            Err(PmuError::NotModifiable("RO".to_string()))
        );
        assert_eq!(machine.write_counts(), vec![0]);

        let mut out = [0x55u8; PAYLOAD_SIZE];
        dispatcher
            .ioctl(PMU_IOC_CNTKCTL_GET, UserSlice::writable(&mut out))
            .unwrap();
        assert_eq!(PmuctlToggle::from_bytes(out).enable, 0);
    }

    #[test]
    fn get_on_hidden_control_unsupported() {
        let (machine, dispatcher) = partial();
        let mut buf = toggle(1);
        dispatcher
            .ioctl(PMU_IOC_PMCCNTR, UserSlice::readable(&mut buf))
            .unwrap();
        assert_eq!(machine.pmccntr_states(), vec![true]);

        let mut out = [0x55u8; PAYLOAD_SIZE];
        assert_eq!(
            dispatcher.ioctl(PMU_IOC_PMCCNTR_GET, UserSlice::writable(&mut out)),
            Err(PmuError::UnsupportedCommand(PMU_IOC_PMCCNTR_GET))
        );
        assert_eq!(out, [0x55u8; PAYLOAD_SIZE]);
    }
}
