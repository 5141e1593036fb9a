//! SQLite-backed storage for credentials and clinic records.

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use tracing::info;

use crate::{
    auth::CredentialStore,
    clinic::{
        AppointmentSummary, ClinicStore, Doctor, NewAppointment, NewPatient, Patient,
        STATUS_COMPLETED,
    },
    error::StoreError,
    types::{CredentialRecord, HashedPassword, UserID, Username},
};

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT UNIQUE NOT NULL,
        password TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS patients (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        phone TEXT NOT NULL DEFAULT '',
        blood_group TEXT NOT NULL DEFAULT '',
        notes TEXT
    );

    CREATE TABLE IF NOT EXISTS doctors (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        specialty TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS appointments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        patient_id INTEGER NOT NULL REFERENCES patients(id),
        doctor_id INTEGER NOT NULL REFERENCES doctors(id),
        appointment_date TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'Scheduled'
    );
";

const DEFAULT_DOCTORS: &[(&str, &str)] = &[
    ("Dr. Rajesh Kumar", "General Physician"),
    ("Dr. Sarah Smith", "Cardiologist"),
    ("Dr. Emily Chen", "Dermatologist"),
    ("Dr. Michael Brown", "Neurologist"),
    ("Dr. Priya Patel", "Pediatrician"),
    ("Dr. James Wilson", "Orthopedic Surgeon"),
];

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
            rusqlite::Error::SqliteFailure(ref err, _)
                if err.code == ErrorCode::ConstraintViolation =>
            {
                StoreError::Constraint
            }
            e => StoreError::Backend {
                source: Box::new(e),
            },
        }
    }
}

/// One shared connection. Statements run on the blocking pool and hold the
/// lock only while they execute.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Self::seed_doctors(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn seed_doctors(conn: &Connection) -> Result<(), StoreError> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM doctors", [], |row| row.get(0))?;
        if count > 0 {
            return Ok(());
        }

        for (name, specialty) in DEFAULT_DOCTORS {
            conn.execute(
                "INSERT INTO doctors (name, specialty) VALUES (?1, ?2)",
                params![name, specialty],
            )?;
        }
        info!(count = DEFAULT_DOCTORS.len(), "seeded default doctor roster");
        Ok(())
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&*conn)
        })
        .await
        .map_err(|e| StoreError::Backend {
            source: Box::new(e),
        })?
    }
}

fn patient_from_row(row: &Row<'_>) -> rusqlite::Result<Patient> {
    Ok(Patient {
        id: row.get(0)?,
        name: row.get(1)?,
        phone: row.get(2)?,
        blood_group: row.get(3)?,
        notes: row.get(4)?,
    })
}

fn doctor_from_row(row: &Row<'_>) -> rusqlite::Result<Doctor> {
    Ok(Doctor {
        id: row.get(0)?,
        name: row.get(1)?,
        specialty: row.get(2)?,
    })
}

fn select_patient(conn: &Connection, id: i64) -> Result<Option<Patient>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT id, name, phone, blood_group, notes FROM patients WHERE id = ?1",
            params![id],
            patient_from_row,
        )
        .optional()?)
}

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn insert_user(
        &self,
        username: &Username,
        hashed_password: &HashedPassword,
    ) -> Result<UserID, StoreError> {
        let username = username.0.clone();
        let hashed_password = hashed_password.0.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO users (username, password) VALUES (?1, ?2)",
                params![username, hashed_password],
            )?;
            Ok(UserID(conn.last_insert_rowid()))
        })
        .await
    }

    async fn find_user(&self, username: &Username) -> Result<Option<CredentialRecord>, StoreError> {
        let username = username.0.clone();
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT id, username, password FROM users WHERE username = ?1",
                    params![username],
                    |row| {
                        Ok(CredentialRecord {
                            id: UserID(row.get(0)?),
                            username: Username(row.get(1)?),
                            password_hash: HashedPassword(row.get(2)?),
                        })
                    },
                )
                .optional()?)
        })
        .await
    }
}

#[async_trait]
impl ClinicStore for SqliteStore {
    async fn list_patients(&self) -> Result<Vec<Patient>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, name, phone, blood_group, notes FROM patients ORDER BY id")?;
            let patients = stmt
                .query_map([], patient_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(patients)
        })
        .await
    }

    async fn create_patient(&self, patient: &NewPatient) -> Result<Patient, StoreError> {
        let patient = patient.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO patients (name, phone, blood_group) VALUES (?1, ?2, ?3)",
                params![patient.name, patient.phone, patient.blood_group],
            )?;
            select_patient(conn, conn.last_insert_rowid())?.ok_or(StoreError::NotFound)
        })
        .await
    }

    async fn find_patient(&self, id: i64) -> Result<Option<Patient>, StoreError> {
        self.with_conn(move |conn| select_patient(conn, id)).await
    }

    async fn update_patient_notes(&self, id: i64, notes: &str) -> Result<Patient, StoreError> {
        let notes = notes.to_string();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE patients SET notes = ?1 WHERE id = ?2",
                params![notes, id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            select_patient(conn, id)?.ok_or(StoreError::NotFound)
        })
        .await
    }

    async fn list_doctors(&self) -> Result<Vec<Doctor>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name, specialty FROM doctors ORDER BY id")?;
            let doctors = stmt
                .query_map([], doctor_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(doctors)
        })
        .await
    }

    async fn find_doctor(&self, id: i64) -> Result<Option<Doctor>, StoreError> {
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT id, name, specialty FROM doctors WHERE id = ?1",
                    params![id],
                    doctor_from_row,
                )
                .optional()?)
        })
        .await
    }

    async fn list_appointments(&self) -> Result<Vec<AppointmentSummary>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT appointments.id, patients.name, doctors.name,
                        appointments.appointment_date, appointments.status
                 FROM appointments
                 JOIN patients ON appointments.patient_id = patients.id
                 JOIN doctors ON appointments.doctor_id = doctors.id
                 ORDER BY appointments.appointment_date ASC, appointments.id ASC",
            )?;
            let appointments = stmt
                .query_map([], |row| {
                    Ok(AppointmentSummary {
                        id: row.get(0)?,
                        patient_name: row.get(1)?,
                        doctor_name: row.get(2)?,
                        appointment_date: row.get(3)?,
                        status: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(appointments)
        })
        .await
    }

    async fn create_appointment(&self, appointment: &NewAppointment) -> Result<i64, StoreError> {
        let appointment = appointment.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO appointments (patient_id, doctor_id, appointment_date)
                 VALUES (?1, ?2, ?3)",
                params![
                    appointment.patient_id,
                    appointment.doctor_id,
                    appointment.appointment_date
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn complete_appointment(&self, id: i64) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE appointments SET status = ?1 WHERE id = ?2",
                params![STATUS_COMPLETED, id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clinic::STATUS_SCHEDULED;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn patient(name: &str) -> NewPatient {
        NewPatient {
            name: name.into(),
            phone: "+15550001".into(),
            blood_group: "A+".into(),
        }
    }

    #[tokio::test]
    async fn duplicate_username_is_a_constraint_violation() {
        let store = store();
        let name = Username("alice".into());
        let id = store
            .insert_user(&name, &HashedPassword("$2b$first".into()))
            .await
            .unwrap();

        let again = store
            .insert_user(&name, &HashedPassword("$2b$second".into()))
            .await;
        assert!(matches!(again, Err(StoreError::Constraint)));

        let record = store.find_user(&name).await.unwrap().unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.password_hash.0, "$2b$first");
    }

    #[tokio::test]
    async fn unknown_user_is_none() {
        let found = store().find_user(&Username("ghost".into())).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn doctors_are_seeded_once() {
        let dir = std::env::temp_dir().join(format!("crm-{}.db", uuid::Uuid::new_v4()));
        let first = SqliteStore::open(&dir).unwrap();
        assert_eq!(first.list_doctors().await.unwrap().len(), DEFAULT_DOCTORS.len());
        drop(first);

        let reopened = SqliteStore::open(&dir).unwrap();
        assert_eq!(
            reopened.list_doctors().await.unwrap().len(),
            DEFAULT_DOCTORS.len()
        );
        drop(reopened);
        let _ = std::fs::remove_file(&dir);
    }

    #[tokio::test]
    async fn patient_notes_round_trip() {
        let store = store();
        let created = store.create_patient(&patient("Ann")).await.unwrap();
        assert_eq!(created.notes, None);

        let updated = store
            .update_patient_notes(created.id, "mild fever, 3 days")
            .await
            .unwrap();
        assert_eq!(updated.notes.as_deref(), Some("mild fever, 3 days"));
        assert_eq!(store.list_patients().await.unwrap(), vec![updated]);
    }

    #[tokio::test]
    async fn appointments_join_names_in_date_order() {
        let store = store();
        let ann = store.create_patient(&patient("Ann")).await.unwrap();
        let bo = store.create_patient(&patient("Bo")).await.unwrap();
        let doctor = store.find_doctor(2).await.unwrap().unwrap();

        for (p, date) in [(&ann, "2026-03-02T09:00"), (&bo, "2026-03-01T09:00")] {
            store
                .create_appointment(&NewAppointment {
                    patient_id: p.id,
                    doctor_id: doctor.id,
                    appointment_date: date.into(),
                })
                .await
                .unwrap();
        }

        let listed = store.list_appointments().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].patient_name, "Bo");
        assert_eq!(listed[1].patient_name, "Ann");
        assert_eq!(listed[0].doctor_name, doctor.name);
        assert!(listed.iter().all(|a| a.status == STATUS_SCHEDULED));
    }

    #[tokio::test]
    async fn appointment_with_unknown_doctor_is_rejected() {
        let store = store();
        let ann = store.create_patient(&patient("Ann")).await.unwrap();
        let result = store
            .create_appointment(&NewAppointment {
                patient_id: ann.id,
                doctor_id: 404,
                appointment_date: "2026-03-01".into(),
            })
            .await;
        assert!(matches!(result, Err(StoreError::Constraint)));
    }

    #[tokio::test]
    async fn completing_marks_status() {
        let store = store();
        let ann = store.create_patient(&patient("Ann")).await.unwrap();
        let id = store
            .create_appointment(&NewAppointment {
                patient_id: ann.id,
                doctor_id: 1,
                appointment_date: "2026-03-01".into(),
            })
            .await
            .unwrap();

        store.complete_appointment(id).await.unwrap();
        assert_eq!(
            store.list_appointments().await.unwrap()[0].status,
            STATUS_COMPLETED
        );
        assert!(matches!(
            store.complete_appointment(id + 100).await,
            Err(StoreError::NotFound)
        ));
    }
}
