use fieldops_core::types::{TicketPriority, TicketStatus, UserProfile, UserRole};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::tickets::TicketService;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EngineerWorkload {
    pub engineer_id: String,
    pub full_name: String,
    pub open_tickets: usize,
    pub resolved_tickets: usize,
    pub overdue_tickets: usize,
    pub hours_logged: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TicketSummary {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_priority: BTreeMap<String, usize>,
    pub overdue: usize,
    pub unassigned: usize,
    pub high_priority_open: usize,
    pub average_resolution_hours: Option<f64>,
    pub workload: Vec<EngineerWorkload>,
}

impl TicketService {
    /// Aggregates over the tickets `viewer` is allowed to see.
    pub async fn summary_for(&self, viewer: &UserProfile) -> TicketSummary {
        let now = self.now();
        let tickets = self.visible_to(viewer).await;

        let mut by_status: BTreeMap<String, usize> = TicketStatus::ALL
            .iter()
            .map(|s| (s.to_string(), 0))
            .collect();
        let mut by_priority: BTreeMap<String, usize> = [
            TicketPriority::Low,
            TicketPriority::Medium,
            TicketPriority::High,
            TicketPriority::Critical,
        ]
        .iter()
        .map(|p| (p.to_string(), 0))
        .collect();

        let mut resolution_hours = Vec::new();
        for ticket in &tickets {
            *by_status.entry(ticket.status.to_string()).or_default() += 1;
            *by_priority.entry(ticket.priority.to_string()).or_default() += 1;
            if let Some(hours) = ticket.resolution_hours() {
                resolution_hours.push(hours);
            }
        }

        let average_resolution_hours = if resolution_hours.is_empty() {
            None
        } else {
            let avg = resolution_hours.iter().sum::<f64>() / resolution_hours.len() as f64;
            Some((avg * 100.0).round() / 100.0)
        };

        let engineers: Vec<UserProfile> = if viewer.role.is_manager() {
            self.users()
                .users_with_roles(&[UserRole::FieldEngineer])
                .await
        } else {
            vec![viewer.clone()]
        };

        let workload = engineers
            .into_iter()
            .map(|engineer| {
                let assigned: Vec<_> = tickets
                    .iter()
                    .filter(|t| t.assigned_to.as_deref() == Some(engineer.id.as_str()))
                    .collect();
                EngineerWorkload {
                    open_tickets: assigned.iter().filter(|t| t.is_open()).count(),
                    resolved_tickets: assigned.iter().filter(|t| t.status.is_resolved()).count(),
                    overdue_tickets: assigned.iter().filter(|t| t.is_overdue(now)).count(),
                    hours_logged: assigned.iter().map(|t| t.actual_hours).sum(),
                    engineer_id: engineer.id,
                    full_name: engineer.full_name,
                }
            })
            .collect();

        TicketSummary {
            total: tickets.len(),
            overdue: tickets.iter().filter(|t| t.is_overdue(now)).count(),
            unassigned: tickets
                .iter()
                .filter(|t| t.assigned_to.is_none() && t.is_open())
                .count(),
            high_priority_open: tickets
                .iter()
                .filter(|t| t.is_high_priority() && t.is_open())
                .count(),
            by_status,
            by_priority,
            average_resolution_hours,
            workload,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::Fixture;
    use chrono::Duration;
    use fieldops_core::types::TicketStatus;

    #[tokio::test]
    async fn summary_counts_and_resolution_time() {
        let fx = Fixture::new().await;
        let done = fx.assigned_ticket("Done").await;
        fx.assigned_ticket("Pending").await;

        fx.clock.advance(Duration::hours(4));
        for status in [TicketStatus::InProgress, TicketStatus::Resolved] {
            fx.tickets
                .change_status(&fx.engineer, &done.id, status)
                .await
                .unwrap();
        }

        let summary = fx.tickets.summary_for(&fx.admin).await;
        assert_eq!(summary.total, 2);
        assert_eq!(summary.by_status["resolved"], 1);
        assert_eq!(summary.by_status["assigned"], 1);
        assert_eq!(summary.by_status["closed"], 0);
        assert_eq!(summary.by_priority["medium"], 2);
        assert_eq!(summary.unassigned, 0);
        assert_eq!(summary.average_resolution_hours, Some(4.0));

        assert_eq!(summary.workload.len(), 2);
        let mine = summary
            .workload
            .iter()
            .find(|w| w.engineer_id == fx.engineer.id)
            .unwrap();
        assert_eq!(mine.open_tickets, 1);
        assert_eq!(mine.resolved_tickets, 1);
    }

    #[tokio::test]
    async fn engineers_get_a_scoped_summary() {
        let fx = Fixture::new().await;
        fx.assigned_ticket("Mine").await;

        let summary = fx.tickets.summary_for(&fx.other_engineer).await;
        assert_eq!(summary.total, 0);
        assert_eq!(summary.workload.len(), 1);
        assert_eq!(summary.workload[0].engineer_id, fx.other_engineer.id);
        assert_eq!(summary.average_resolution_hours, None);
    }
}
