//! Applications shipped with the controller.
mod echo;
mod flow_monitor;
mod learning_switch;

pub use self::echo::EchoResponder;
pub use self::flow_monitor::FlowMonitor;
pub use self::learning_switch::LearningSwitch;
