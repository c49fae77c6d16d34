//! Creating, editing and removing events.

use super::{
    ensure_manages,
    ledger::{self, Removal},
    permission::EligibilityDescriptor,
};
use crate::{
    auth::Actor,
    cfg::Settings,
    error::{CampusError, ParseTimeSnafu},
    state::{
        db::CampusDb,
        db_objects::{EventDetails, NewEvent},
    },
};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use snafu::ResultExt;

#[derive(Deserialize, Debug, Clone)]
pub struct EventForm {
    pub event_name: String,
    pub start_date: String,
    pub working_hour: i32,
    pub limit: i32,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub branch_ids: Vec<u32>,
    #[serde(default)]
    pub years: Vec<u32>,
}

/// Reads a wall-clock time in the configured timezone.
pub fn parse_start_date(raw: &str, settings: &Settings) -> Result<DateTime<Utc>, CampusError> {
    let tz: Tz = settings
        .timezone_id
        .parse()
        .map_err(|_| CampusError::UnknownTimezone {
            timezone: settings.timezone_id.clone(),
        })?;

    let naive = NaiveDateTime::parse_from_str(raw.trim(), &settings.date_time_format).context(
        ParseTimeSnafu {
            original: raw.to_string(),
        },
    )?;

    tz.from_local_datetime(&naive)
        .single()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| CampusError::AmbiguousTime {
            original: raw.to_string(),
        })
}

async fn details_from_form(
    db: &CampusDb,
    settings: &Settings,
    form: EventForm,
) -> Result<(EventDetails, i32), CampusError> {
    if form.event_name.trim().is_empty() {
        return Err(CampusError::InvalidRequest {
            reason: "event name must not be empty".into(),
        });
    }
    if form.working_hour < 0 {
        return Err(CampusError::InvalidRequest {
            reason: "working hours must not be negative".into(),
        });
    }
    if form.limit <= 0 {
        return Err(CampusError::InvalidRequest {
            reason: "limit must be positive".into(),
        });
    }

    let start_date = parse_start_date(&form.start_date, settings)?;
    let descriptor = EligibilityDescriptor::build(db, form.branch_ids, form.years)
        .await?
        .encode()?;

    Ok((
        EventDetails {
            event_name: form.event_name,
            start_date,
            working_hour: form.working_hour,
            detail: form.detail,
            location: form.location,
            descriptor,
        },
        form.limit,
    ))
}

#[instrument(level = "debug", skip(db, settings, form), fields(event_name = %form.event_name))]
pub async fn create_event(
    db: &CampusDb,
    settings: &Settings,
    actor: Actor,
    form: EventForm,
) -> Result<i32, CampusError> {
    let (details, limit) = details_from_form(db, settings, form).await?;
    let event_id = db
        .create_event(NewEvent {
            creator: actor.id,
            limit,
            details,
        })
        .await?;

    info!(event_id, creator = actor.id, limit, "Created event");
    Ok(event_id)
}

/// Details and the new limit commit together, so a limit below the enrolment count leaves the
/// event untouched.
#[instrument(level = "debug", skip(db, settings, form))]
pub async fn edit_event(
    db: &CampusDb,
    settings: &Settings,
    actor: Actor,
    event_id: i32,
    form: EventForm,
) -> Result<(), CampusError> {
    let event = db
        .event_by_id(event_id)
        .await?
        .ok_or(CampusError::EventNotFound { event_id })?;
    ensure_manages(actor, &event)?;

    let (details, limit) = details_from_form(db, settings, form).await?;
    let free_space = ledger::revise_event(db, event_id, limit, details).await?;

    info!(event_id, limit, free_space, "Updated event");
    Ok(())
}

#[instrument(level = "debug", skip(db))]
pub async fn delete_event(
    db: &CampusDb,
    actor: Actor,
    event_id: i32,
) -> Result<Removal, CampusError> {
    let event = db
        .event_by_id(event_id)
        .await?
        .ok_or(CampusError::EventNotFound { event_id })?;
    ensure_manages(actor, &event)?;

    let removal = ledger::remove_event(db, event_id).await?;
    info!(event_id, ?removal, "Removed event");
    Ok(removal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::Role,
        enrolment::{fixtures::Campus, orchestrator::join_event},
    };
    use chrono::{Datelike, Timelike};

    fn form(limit: i32) -> EventForm {
        EventForm {
            event_name: "Blood drive".into(),
            start_date: "2024-11-02 09:30:00".into(),
            working_hour: 2,
            limit,
            detail: "Bring ID".into(),
            location: "Gym".into(),
            branch_ids: vec![],
            years: vec![],
        }
    }

    fn settings() -> Settings {
        Settings::defaults().unwrap()
    }

    #[test]
    fn start_dates_are_local_to_the_campus() {
        let parsed = parse_start_date("2024-11-02 09:30:00", &settings()).unwrap();
        //Bangkok is UTC+7 with no daylight saving
        assert_eq!(parsed.hour(), 2);
        assert_eq!(parsed.minute(), 30);
        assert_eq!(parsed.day(), 2);
    }

    #[test]
    fn bad_start_dates() {
        assert!(matches!(
            parse_start_date("02/11/2024", &settings()).unwrap_err(),
            CampusError::ParseTime { .. }
        ));

        let mut settings = settings();
        settings.timezone_id = "Mars/Olympus_Mons".into();
        assert!(matches!(
            parse_start_date("2024-11-02 09:30:00", &settings).unwrap_err(),
            CampusError::UnknownTimezone { .. }
        ));
    }

    #[tokio::test]
    async fn created_events_are_open_with_full_capacity() {
        let campus = Campus::new().await;
        let mut f = form(25);
        f.branch_ids = vec![campus.branch.unsigned_abs()];
        let id = create_event(&campus.db, &settings(), campus.teacher, f)
            .await
            .unwrap();

        let event = campus.db.event_by_id(id).await.unwrap().unwrap();
        assert_eq!(event.free_space, 25);
        assert!(event.status);
        assert_eq!(event.creator, campus.teacher.id);
        assert!(!event.allow_all_branch);
        assert!(event.allow_all_year);
    }

    #[tokio::test]
    async fn creation_validates_branches_and_limits() {
        let campus = Campus::new().await;
        let mut f = form(5);
        f.branch_ids = vec![4040];
        assert!(matches!(
            create_event(&campus.db, &settings(), campus.teacher, f)
                .await
                .unwrap_err(),
            CampusError::UnknownBranch { branch_id: 4040 }
        ));
        assert!(matches!(
            create_event(&campus.db, &settings(), campus.teacher, form(0))
                .await
                .unwrap_err(),
            CampusError::InvalidRequest { .. }
        ));
        assert!(campus.db.all_events().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn editing_below_enrolment_keeps_the_old_event() {
        let campus = Campus::new().await;
        let id = create_event(&campus.db, &settings(), campus.teacher, form(5))
            .await
            .unwrap();
        for n in 1..=3 {
            let s = campus.student(n, campus.branch, 1).await;
            join_event(&campus.db, id, s).await.unwrap();
        }

        let mut shrunk = form(2);
        shrunk.event_name = "Renamed".into();
        assert!(matches!(
            edit_event(&campus.db, &settings(), campus.teacher, id, shrunk)
                .await
                .unwrap_err(),
            CampusError::CapacityBelowEnrolled { .. }
        ));
        let event = campus.db.event_by_id(id).await.unwrap().unwrap();
        assert_eq!(event.event_name, "Blood drive");
        assert_eq!(event.free_space, 2);

        let mut grown = form(8);
        grown.event_name = "Renamed".into();
        edit_event(&campus.db, &settings(), campus.teacher, id, grown)
            .await
            .unwrap();
        let event = campus.db.event_by_id(id).await.unwrap().unwrap();
        assert_eq!(event.event_name, "Renamed");
        assert_eq!(event.free_space, 5);
    }

    #[tokio::test]
    async fn only_creators_edit_or_delete() {
        let campus = Campus::new().await;
        let id = create_event(&campus.db, &settings(), campus.teacher, form(5))
            .await
            .unwrap();
        let staff = Actor {
            id: campus.teacher.id + 1,
            role: Role::Staff,
        };

        assert!(matches!(
            edit_event(&campus.db, &settings(), staff, id, form(6))
                .await
                .unwrap_err(),
            CampusError::NotCreator { .. }
        ));
        assert!(matches!(
            delete_event(&campus.db, staff, id).await.unwrap_err(),
            CampusError::NotCreator { .. }
        ));
        assert_eq!(
            delete_event(&campus.db, campus.teacher, id).await.unwrap(),
            Removal::Deleted
        );
    }
}
