use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- stepping, shown to the user ------------------------------
    #[error("Reached last statement")]
    LastStatement,
    #[error("Reached first statement")]
    FirstStatement,
    #[error("Branching control flow. Use step into target.")]
    BranchingControlFlow,
    #[error("Ambiguous path through function {0}")]
    AmbiguousPath(String),
    #[error("Ambiguous path through function {0} for {1}")]
    AmbiguousPathInThread(String, String),
    #[error("Cannot step. Path is ambiguous for {0}.")]
    AmbiguousStep(String),
    #[error("Ambiguous function call")]
    AmbiguousCall,
    #[error("Cannot step back. Path is ambiguous.")]
    AmbiguousStepBack,
    #[error("Location is unavailable")]
    LocationUnavailable,
    #[error("Cannot step out from the top of the call stack")]
    TopOfCallStack,
    #[error("Cannot step out. The call stack is ambiguous.")]
    AmbiguousCallStack,
    #[error("Cannot step out. The function never returns.")]
    FunctionNeverReturns,
    #[error("Ambiguous return path for {0}")]
    AmbiguousReturnPath(String),
    #[error("No matching path from {0}")]
    NoMatchingPath(String),
    #[error("Path is ambiguous from {0}")]
    AmbiguousPathFrom(String),
    #[error("{0}")]
    UserExpression(String),
    #[error("Expression evaluation requires a stack frame")]
    NoFrameForExpression,
    #[error("Request \"{0}\" is not supported")]
    UnsupportedRequest(String),
    #[error("invalid request arguments: {0}")]
    InvalidArguments(String),

    // --------------------------------- invariant violations -------------------------------------
    #[error("thread {0} not found")]
    ThreadNotFound(i64),
    #[error("frame {0} not found")]
    FrameNotFound(i64),
    #[error("unknown step-in target {0}")]
    UnknownStepTarget(i64),
    #[error("variables reference {0} not found")]
    VariablesReferenceNotFound(i64),
    #[error("ARG node {0} not found")]
    NodeNotFound(String),
    #[error("ARG node query for {0} is ambiguous")]
    AmbiguousNode(String),
    #[error("no entry node reachable from {0}")]
    NoEntryNode(String),

    // --------------------------------- oracle transport -----------------------------------------
    #[error("oracle unavailable: {0}")]
    OracleUnavailable(#[from] io::Error),
    #[error("oracle rejected request: {0}")]
    OracleRejected(String),
    #[error("malformed oracle reply: {0}")]
    OracleProtocol(#[from] serde_json::Error),
}

impl Error {
    /// Return a hint to the adapter - show the message to the user verbatim
    /// or hide it behind a generic server error.
    pub fn is_user_facing(&self) -> bool {
        match self {
            Error::LastStatement => true,
            Error::FirstStatement => true,
            Error::BranchingControlFlow => true,
            Error::AmbiguousPath(_) => true,
            Error::AmbiguousPathInThread(_, _) => true,
            Error::AmbiguousStep(_) => true,
            Error::AmbiguousCall => true,
            Error::AmbiguousStepBack => true,
            Error::LocationUnavailable => true,
            Error::TopOfCallStack => true,
            Error::AmbiguousCallStack => true,
            Error::FunctionNeverReturns => true,
            Error::AmbiguousReturnPath(_) => true,
            Error::NoMatchingPath(_) => true,
            Error::AmbiguousPathFrom(_) => true,
            Error::UserExpression(_) => true,
            Error::NoFrameForExpression => true,
            Error::UnsupportedRequest(_) => true,
            Error::InvalidArguments(_) => true,

            Error::ThreadNotFound(_) => false,
            Error::FrameNotFound(_) => false,
            Error::UnknownStepTarget(_) => false,
            Error::VariablesReferenceNotFound(_) => false,
            Error::NodeNotFound(_) => false,
            Error::AmbiguousNode(_) => false,
            Error::NoEntryNode(_) => false,

            Error::OracleUnavailable(_) => false,
            Error::OracleRejected(_) => false,
            Error::OracleProtocol(_) => false,
        }
    }

    /// True for failures of the analyzer connection itself. The request
    /// fails but the session survives them.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::OracleUnavailable(_) | Error::OracleRejected(_) | Error::OracleProtocol(_)
        )
    }
}
