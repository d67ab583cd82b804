use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::domain::{BackgroundCheck, CheckId, CheckStatus};
use super::escalation::{EscalationEvent, EscalationRule};
use super::history::{HistoryFilter, StatusChangeRecord};
use super::reminders::{ConsentRequest, RefereeState, ReminderUpdate};
use super::repository::{
    CheckFilter, CheckRepository, EscalationEventFilter, EscalationRepository, HistoryRepository,
    ReminderRepository, RepositoryError, SlaConfigRepository,
};
use super::sla::{SlaClassification, SlaConfiguration};

/// Process-local store backing demos and tests.
#[derive(Default, Clone)]
pub struct InMemoryScreeningStore {
    checks: Arc<Mutex<BTreeMap<CheckId, BackgroundCheck>>>,
    sla_configs: Arc<Mutex<BTreeMap<CheckStatus, SlaConfiguration>>>,
    rules: Arc<Mutex<Vec<EscalationRule>>>,
    events: Arc<Mutex<Vec<EscalationEvent>>>,
    history: Arc<Mutex<Vec<StatusChangeRecord>>>,
    referees: Arc<Mutex<HashMap<String, RefereeState>>>,
    consents: Arc<Mutex<HashMap<String, ConsentRequest>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable("in-memory store poisoned".to_string()))
}

impl CheckRepository for InMemoryScreeningStore {
    fn insert_check(&self, check: BackgroundCheck) -> Result<BackgroundCheck, RepositoryError> {
        let mut guard = lock(&self.checks)?;
        if guard.contains_key(&check.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(check.id.clone(), check.clone());
        Ok(check)
    }

    fn update_check(&self, check: BackgroundCheck) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.checks)?;
        match guard.get_mut(&check.id) {
            Some(existing) => {
                *existing = check;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn record_sla_alert(
        &self,
        id: &CheckId,
        status: CheckStatus,
        status_since: DateTime<Utc>,
        classification: SlaClassification,
    ) -> Result<bool, RepositoryError> {
        let mut guard = lock(&self.checks)?;
        let check = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        Ok(check.record_sla_alert(status, status_since, classification))
    }

    fn fetch_check(&self, id: &CheckId) -> Result<Option<BackgroundCheck>, RepositoryError> {
        Ok(lock(&self.checks)?.get(id).cloned())
    }

    fn list_checks(&self, filter: &CheckFilter) -> Result<Vec<BackgroundCheck>, RepositoryError> {
        Ok(lock(&self.checks)?
            .values()
            .filter(|check| filter.matches(check))
            .cloned()
            .collect())
    }
}

impl SlaConfigRepository for InMemoryScreeningStore {
    fn upsert_sla_config(&self, config: SlaConfiguration) -> Result<(), RepositoryError> {
        lock(&self.sla_configs)?.insert(config.status, config);
        Ok(())
    }

    fn sla_config_for(
        &self,
        status: CheckStatus,
    ) -> Result<Option<SlaConfiguration>, RepositoryError> {
        Ok(lock(&self.sla_configs)?.get(&status).cloned())
    }

    fn list_sla_configs(&self) -> Result<Vec<SlaConfiguration>, RepositoryError> {
        Ok(lock(&self.sla_configs)?.values().cloned().collect())
    }
}

impl EscalationRepository for InMemoryScreeningStore {
    fn insert_rule(&self, rule: EscalationRule) -> Result<EscalationRule, RepositoryError> {
        let mut guard = lock(&self.rules)?;
        if guard.iter().any(|existing| existing.id == rule.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.push(rule.clone());
        Ok(rule)
    }

    fn update_rule(&self, rule: EscalationRule) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.rules)?;
        let existing = guard
            .iter_mut()
            .find(|existing| existing.id == rule.id)
            .ok_or(RepositoryError::NotFound)?;
        *existing = rule;
        Ok(())
    }

    fn list_rules(&self) -> Result<Vec<EscalationRule>, RepositoryError> {
        Ok(lock(&self.rules)?.clone())
    }

    fn insert_event(&self, event: EscalationEvent) -> Result<EscalationEvent, RepositoryError> {
        let mut guard = lock(&self.events)?;
        if guard.iter().any(|existing| existing.id == event.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.push(event.clone());
        Ok(event)
    }

    fn update_event(&self, event: EscalationEvent) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.events)?;
        let existing = guard
            .iter_mut()
            .find(|existing| existing.id == event.id)
            .ok_or(RepositoryError::NotFound)?;
        *existing = event;
        Ok(())
    }

    fn fetch_event(&self, id: &str) -> Result<Option<EscalationEvent>, RepositoryError> {
        Ok(lock(&self.events)?
            .iter()
            .find(|event| event.id == id)
            .cloned())
    }

    fn list_events(
        &self,
        filter: &EscalationEventFilter,
    ) -> Result<Vec<EscalationEvent>, RepositoryError> {
        let mut events: Vec<_> = lock(&self.events)?
            .iter()
            .filter(|event| filter.matches(event))
            .cloned()
            .collect();
        events.sort_by_key(|event| event.triggered_at);
        Ok(events)
    }
}

impl HistoryRepository for InMemoryScreeningStore {
    fn append_history(&self, record: StatusChangeRecord) -> Result<(), RepositoryError> {
        lock(&self.history)?.push(record);
        Ok(())
    }

    fn list_history(
        &self,
        filter: &HistoryFilter,
    ) -> Result<Vec<StatusChangeRecord>, RepositoryError> {
        Ok(lock(&self.history)?
            .iter()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect())
    }
}

impl ReminderRepository for InMemoryScreeningStore {
    fn insert_referee(&self, referee: RefereeState) -> Result<RefereeState, RepositoryError> {
        let mut guard = lock(&self.referees)?;
        if guard.contains_key(&referee.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(referee.id.clone(), referee.clone());
        Ok(referee)
    }

    fn apply_referee_update(
        &self,
        id: &str,
        update: ReminderUpdate,
    ) -> Result<Option<RefereeState>, RepositoryError> {
        let mut guard = lock(&self.referees)?;
        let referee = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        Ok(referee.apply(update).then(|| referee.clone()))
    }

    fn fetch_referee(&self, id: &str) -> Result<Option<RefereeState>, RepositoryError> {
        Ok(lock(&self.referees)?.get(id).cloned())
    }

    fn list_referees(
        &self,
        check_id: Option<&CheckId>,
    ) -> Result<Vec<RefereeState>, RepositoryError> {
        let mut referees: Vec<_> = lock(&self.referees)?
            .values()
            .filter(|referee| check_id.map_or(true, |id| &referee.check_id == id))
            .cloned()
            .collect();
        referees.sort_by(|a, b| (a.invited_date, &a.id).cmp(&(b.invited_date, &b.id)));
        Ok(referees)
    }

    fn insert_consent(&self, consent: ConsentRequest) -> Result<ConsentRequest, RepositoryError> {
        let mut guard = lock(&self.consents)?;
        if guard.contains_key(&consent.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(consent.id.clone(), consent.clone());
        Ok(consent)
    }

    fn apply_consent_update(
        &self,
        id: &str,
        update: ReminderUpdate,
    ) -> Result<Option<ConsentRequest>, RepositoryError> {
        let mut guard = lock(&self.consents)?;
        let consent = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        Ok(consent.apply(update).then(|| consent.clone()))
    }

    fn list_consents(
        &self,
        check_id: Option<&CheckId>,
    ) -> Result<Vec<ConsentRequest>, RepositoryError> {
        let mut consents: Vec<_> = lock(&self.consents)?
            .values()
            .filter(|consent| check_id.map_or(true, |id| &consent.check_id == id))
            .cloned()
            .collect();
        consents.sort_by(|a, b| (a.sent_date, &a.id).cmp(&(b.sent_date, &b.id)));
        Ok(consents)
    }
}
