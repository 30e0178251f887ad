//! Human-readable explanations built strictly from recorded evidence.
//!
//! Every line cites a condition observation, a scoring signal, a flag's
//! evidence map or an exit trigger's own inputs. Nothing here recomputes or
//! infers; if a value was not recorded during evaluation it cannot appear
//! in the explanation.

use crate::types::{DiscoveryResult, ExitSignal, Flag};

/// Render a full discovery report for one evaluated candidate.
pub fn explain_discovery(result: &DiscoveryResult) -> String {
    let c = &result.candidate;
    let mut lines = Vec::new();

    lines.push(format!(
        "{} ({}) on {} — composite {:.1} [{}]",
        c.symbol,
        c.address,
        c.chain,
        c.scores.composite,
        if result.qualifies { "QUALIFIES" } else { "does not qualify" }
    ));
    lines.push(format!(
        "  scores: momentum {:.1} | liquidity {:.1} | risk {:.1} | confidence {:.1}",
        c.scores.momentum, c.scores.liquidity, c.scores.risk, c.scores.confidence
    ));
    lines.push(format!(
        "  conditions: {}/{} passed",
        result.passed, result.total
    ));
    for condition in &result.conditions {
        let mark = if condition.passed { "+" } else { "-" };
        lines.push(format!(
            "    [{}] {}: {} (threshold {})",
            mark, condition.name, condition.evidence, condition.threshold
        ));
    }
    if !c.signals.is_empty() {
        lines.push(format!("  signals: {}", c.signals.join("; ")));
    }
    for flag in &c.flags {
        lines.push(format!("  {}", explain_flag(flag)));
    }
    lines.join("\n")
}

/// One-line flag explanation: kind, severity, message, then each recorded
/// evidence field rendered in key order.
pub fn explain_flag(flag: &Flag) -> String {
    let evidence: Vec<String> = flag
        .evidence
        .iter()
        .map(|(key, value)| format!("{}={}", key, value.render()))
        .collect();
    if evidence.is_empty() {
        format!("flag {} ({:?}): {}", flag.kind.as_str(), flag.severity, flag.message)
    } else {
        format!(
            "flag {} ({:?}): {} [{}]",
            flag.kind.as_str(),
            flag.severity,
            flag.message,
            evidence.join(", ")
        )
    }
}

/// Render an exit recommendation.
pub fn explain_exit(signal: &ExitSignal) -> String {
    format!(
        "{:?} ({:?} urgency) — {} — {} at {:.2}x",
        signal.action,
        signal.urgency,
        signal.reason.as_str(),
        signal.message,
        signal.multiple
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Condition, Evidence, EvidenceValue, ExitAction, ExitReason, FlagKind, Severity, Urgency,
    };
    use chrono::Utc;

    #[test]
    fn test_discovery_report_cites_conditions_and_signals() {
        let mut candidate = crate::engine::normalizer::test_support::blank_candidate();
        candidate.symbol = "GEM".into();
        candidate.scores.composite = 72.5;
        candidate.signals.push("Coiling: high volume, flat price".into());

        let result = DiscoveryResult {
            candidate,
            conditions: vec![Condition {
                name: "liquidity_ratio".into(),
                observed: "5.2%".into(),
                threshold: ">= 3%".into(),
                passed: true,
                evidence: "liquidity $52000 / fdv $1000000 = 5.2%".into(),
            }],
            passed: 1,
            total: 8,
            qualifies: false,
        };

        let report = explain_discovery(&result);
        assert!(report.contains("GEM"));
        assert!(report.contains("composite 72.5"));
        assert!(report.contains("does not qualify"));
        assert!(report.contains("1/8 passed"));
        assert!(report.contains("[+] liquidity_ratio"));
        assert!(report.contains("Coiling"));
    }

    #[test]
    fn test_flag_explanation_renders_evidence_fields() {
        let mut evidence = Evidence::new();
        evidence.insert("sell_pct".into(), EvidenceValue::Num(3.2));
        evidence.insert("total_txns".into(), EvidenceValue::Num(312.0));
        let flag = Flag {
            kind: FlagKind::HoneypotSuspected,
            severity: Severity::Critical,
            message: "Only 3.2% of transactions are sells".into(),
            evidence,
            detected_at: Utc::now(),
        };

        let line = explain_flag(&flag);
        assert!(line.contains("honeypot_suspected"));
        assert!(line.contains("sell_pct=3.20"));
        assert!(line.contains("total_txns=312"));
    }

    #[test]
    fn test_exit_explanation_includes_reason_and_multiple() {
        let signal = ExitSignal {
            action: ExitAction::Exit,
            reason: ExitReason::TrailingStop,
            urgency: Urgency::High,
            message: "GEM down 26.0% from 6.0x peak, trailing stop hit".into(),
            multiple: 4.44,
            triggered_at: Utc::now(),
        };
        let line = explain_exit(&signal);
        assert!(line.contains("TRAILING_STOP"));
        assert!(line.contains("4.44x"));
    }
}
