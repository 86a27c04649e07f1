use rust_decimal_macros::dec;

use crate::api::{Marketplace, NormalizedItem};
use crate::scanner::CycleReport;
use crate::strategy::{Evaluation, RiskTag};

/// Message body sent when a profitable listing is found.
pub fn format_alert(evaluation: &Evaluation) -> String {
    let item = &evaluation.item;
    format!(
        "New Flip Alert\n\
         Title: {}\n\
         Link: {}\n\n\
         Costs\n\
         Product: £{:.2}\n\
         Buyer protection: £{:.2}\n\
         Shipping: £{:.2}\n\
         Total: £{:.2}\n\n\
         Potential resale: £{:.2}\n\
         Estimated profit: £{:.2}  [{}]",
        item.title,
        item.url,
        item.price,
        item.buyer_protection_fee,
        item.shipping_cost,
        evaluation.total_cost,
        evaluation.resale_value,
        evaluation.profit,
        evaluation.risk
    )
}

/// Fixed evaluation used by the manual test-alert action.
pub fn sample_evaluation() -> Evaluation {
    let item = NormalizedItem {
        id: "test".to_string(),
        source: Marketplace::Ebay,
        title: "Sample Golf Item".to_string(),
        url: "https://example.com/golf-item".to_string(),
        price: dec!(10.00),
        buyer_protection_fee: dec!(1.00),
        shipping_cost: dec!(2.50),
        seller_score: Some(dec!(99.0)),
        listed_at: None,
    };
    let total_cost = item.price + item.buyer_protection_fee + item.shipping_cost;
    let resale_value = item.price * dec!(1.5);

    Evaluation {
        profit: resale_value - total_cost,
        item,
        total_cost,
        resale_value,
        risk: RiskTag::Low,
    }
}

pub fn format_cycle_summary(report: &CycleReport) -> String {
    let mut output = String::new();

    output.push_str("\n╔══════════════════════════════════════════════════════════════════════╗\n");
    output.push_str("║             POLL CYCLE SUMMARY                                       ║\n");
    output.push_str("╚══════════════════════════════════════════════════════════════════════╝\n\n");

    output.push_str(&format!(
        "🔁 Cycle {} finished in {:.2}s\n",
        report.cycle_id,
        report.duration.as_secs_f64()
    ));
    output.push_str(&format!(
        "📥 Fetched: {} ({} malformed dropped)\n",
        report.fetched, report.rejected
    ));
    if !report.failed_sources.is_empty() {
        let failed: Vec<String> = report.failed_sources.iter().map(|s| s.to_string()).collect();
        output.push_str(&format!("⚠️  Failed sources: {}\n", failed.join(", ")));
    }

    output.push_str("\nOutcomes:\n");
    output.push_str(&format!("   • Already seen:    {}\n", report.outcomes.skipped));
    output.push_str(&format!("   • Below threshold: {}\n", report.outcomes.no_alert));
    output.push_str(&format!("   • Already alerted: {}\n", report.outcomes.already_alerted));
    output.push_str(&format!("   • Alerted:         {}\n", report.outcomes.alerted));
    output.push_str(&format!("   • Send failed:     {}\n", report.outcomes.notify_failed));
    output.push_str(&format!("   • Item errors:     {}\n", report.item_errors));

    output.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_message_layout() {
        let message = format_alert(&sample_evaluation());

        assert!(message.starts_with("New Flip Alert\nTitle: Sample Golf Item\n"));
        assert!(message.contains("Link: https://example.com/golf-item\n\nCosts\n"));
        assert!(message.contains("Product: £10.00\n"));
        assert!(message.contains("Buyer protection: £1.00\n"));
        assert!(message.contains("Shipping: £2.50\n"));
        assert!(message.contains("Total: £13.50\n\n"));
        assert!(message.contains("Potential resale: £15.00\n"));
        assert!(message.ends_with("Estimated profit: £1.50  [Low]"));
    }

    #[test]
    fn test_cycle_summary_mentions_failures() {
        let mut report = CycleReport::new();
        report.fetched = 3;
        report.failed_sources.push(Marketplace::Vinted);
        report.outcomes.alerted = 1;

        let summary = format_cycle_summary(&report);
        assert!(summary.contains("Fetched: 3"));
        assert!(summary.contains("Failed sources: vinted"));
        assert!(summary.contains("Alerted:         1"));
    }
}
