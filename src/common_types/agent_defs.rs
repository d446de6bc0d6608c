use serde::{Deserialize, Serialize};

/// The closed set of worker agents the supervisor can route to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AgentName {
    SearchAgent,
    AnalysisAgent,
    ResponseAgent,
}

impl AgentName {
    pub const ALL: [AgentName; 3] = [
        AgentName::SearchAgent,
        AgentName::AnalysisAgent,
        AgentName::ResponseAgent,
    ];
}

impl std::fmt::Display for AgentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentName::SearchAgent => write!(f, "SearchAgent"),
            AgentName::AnalysisAgent => write!(f, "AnalysisAgent"),
            AgentName::ResponseAgent => write!(f, "ResponseAgent"),
        }
    }
}

impl std::str::FromStr for AgentName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SearchAgent" => Ok(AgentName::SearchAgent),
            "AnalysisAgent" => Ok(AgentName::AnalysisAgent),
            "ResponseAgent" => Ok(AgentName::ResponseAgent),
            _ => Err(anyhow::anyhow!("Unknown AgentName: {}", s)),
        }
    }
}

/// A validated routing decision. Anything outside this set must be rejected
/// at parse time and replaced by the supervisor's deterministic fallback.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RouteDecision {
    Worker(AgentName),
    Finish,
}

impl std::fmt::Display for RouteDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteDecision::Worker(name) => write!(f, "{}", name),
            RouteDecision::Finish => write!(f, "FINISH"),
        }
    }
}

impl std::str::FromStr for RouteDecision {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "FINISH" {
            return Ok(RouteDecision::Finish);
        }
        s.parse::<AgentName>()
            .map(RouteDecision::Worker)
            .map_err(|_| anyhow::anyhow!("Unknown routing decision: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_decision_round_trips_through_display() {
        for name in AgentName::ALL {
            let decision = RouteDecision::Worker(name);
            assert_eq!(decision.to_string().parse::<RouteDecision>().unwrap(), decision);
        }
        assert_eq!("FINISH".parse::<RouteDecision>().unwrap(), RouteDecision::Finish);
    }

    #[test]
    fn hallucinated_agent_names_are_rejected() {
        assert!("MaybeSearchAgent".parse::<RouteDecision>().is_err());
        assert!("searchagent".parse::<RouteDecision>().is_err());
        assert!("FINISH.".parse::<RouteDecision>().is_err());
        assert!("".parse::<RouteDecision>().is_err());
    }
}
