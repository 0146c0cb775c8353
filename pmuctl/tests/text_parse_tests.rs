//! Property tests for the textual write path.

use pmuctl::backends::simulation::SimulatedMachine;
use pmuctl::{ControlRegistry, Dispatcher, SingleCore};
use pmuctl_common::error::PmuError;
use proptest::prelude::*;
use std::sync::Arc;

fn dispatcher() -> (Arc<SimulatedMachine>, Dispatcher) {
    let machine = SimulatedMachine::new(1);
    let (registry, _) = ControlRegistry::standard(machine.registers(), Arc::new(SingleCore));
    (machine, Dispatcher::new(registry))
}

proptest! {
    #[test]
    fn decimal_values_set_nonzero(value in any::<i32>(), pad in "[ \t]{0,3}") {
        let (machine, dispatcher) = dispatcher();
        let request = format!("{pad}PMCCNTR{pad}={pad}{value}{pad}");
        prop_assert_eq!(dispatcher.write_request(request.as_bytes()), Ok(request.len()));
        prop_assert_eq!(machine.pmccntr_states(), vec![value != 0]);
    }

    #[test]
    fn hex_values_set_nonzero(value in any::<u32>()) {
        let (machine, dispatcher) = dispatcher();
        let request = format!("CNTKCTL={value:#x}\n");
        prop_assert!(dispatcher.write_request(request.as_bytes()).is_ok());
        prop_assert_eq!(machine.cntkctl_states(), vec![value != 0]);
    }

    #[test]
    fn requests_without_separator_are_malformed(body in "[A-Z0-9 ]{0,32}") {
        let (machine, dispatcher) = dispatcher();
        prop_assert_eq!(
            dispatcher.write_request(body.as_bytes()),
            Err(PmuError::MalformedRequest)
        );
        prop_assert_eq!(machine.write_counts(), vec![0]);
    }

    #[test]
    fn unknown_names_leave_state_untouched(name in "[A-Z]{1,12}", value in 0i64..2) {
        prop_assume!(name != "PMCCNTR" && name != "CNTKCTL");
        let (machine, dispatcher) = dispatcher();
        let request = format!("{name}={value}");
        prop_assert_eq!(
            dispatcher.write_request(request.as_bytes()),
            Err(PmuError::UnknownControl(name.clone()))
        );
        prop_assert_eq!(machine.write_counts(), vec![0]);
    }

    #[test]
    fn non_numeric_values_rejected(value in "[g-z]{1,8}") {
        let (machine, dispatcher) = dispatcher();
        let request = format!("PMCCNTR={value}");
        prop_assert!(matches!(
            dispatcher.write_request(request.as_bytes()),
            Err(PmuError::InvalidValue(_))
        ));
        prop_assert_eq!(machine.write_counts(), vec![0]);
    }
}
