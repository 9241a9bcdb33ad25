//! ---
//! cms_section: "05-networking-external-interfaces"
//! cms_subsection: "module"
//! cms_type: "source"
//! cms_scope: "code"
//! cms_description: "In-memory maintenance ticket board."
//! cms_version: "v0.0.0-prealpha"
//! cms_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of tickets retained; older ones are dropped.
pub const TICKET_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Open,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub status: TicketStatus,
}

/// Body accepted when raising a ticket.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTicket {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Newest-first ticket list shared by all requests.
#[derive(Debug, Default, Clone)]
pub struct TicketBoard {
    tickets: Arc<RwLock<VecDeque<Ticket>>>,
}

impl TicketBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, request: NewTicket) -> Ticket {
        let title = request
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "Untitled".to_owned());
        let ticket = Ticket {
            id: Uuid::new_v4().to_string(),
            title,
            description: request.description.unwrap_or_default(),
            created_at: Utc::now(),
            status: TicketStatus::Open,
        };
        let mut tickets = self.tickets.write();
        tickets.push_front(ticket.clone());
        tickets.truncate(TICKET_CAPACITY);
        ticket
    }

    pub fn list(&self) -> Vec<Ticket> {
        self.tickets.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tickets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.read().is_empty()
    }
}
