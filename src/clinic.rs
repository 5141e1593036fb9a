use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};

use crate::{
    error::{ApiError, StoreError},
    notify::Notifier,
    triage::{match_specialty, SpecialtyRouter},
    types::Identity,
};

pub const STATUS_SCHEDULED: &str = "Scheduled";
pub const STATUS_COMPLETED: &str = "Completed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub blood_group: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPatient {
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub blood_group: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Doctor {
    pub id: i64,
    pub name: String,
    pub specialty: String,
}

/// An appointment joined with the names of the people involved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentSummary {
    pub id: i64,
    pub patient_name: String,
    pub doctor_name: String,
    pub appointment_date: String,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAppointment {
    #[serde(deserialize_with = "id_from_number_or_string")]
    pub patient_id: i64,
    #[serde(deserialize_with = "id_from_number_or_string")]
    pub doctor_id: i64,
    pub appointment_date: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TriageOutcome {
    pub specialty: String,
    pub doctors: Vec<Doctor>,
}

// the dashboard posts ids straight from <select> values, so they arrive as strings
fn id_from_number_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(i64),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Number(n) => Ok(n),
        RawId::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[async_trait]
pub trait ClinicStore: Send + Sync + 'static {
    async fn list_patients(&self) -> Result<Vec<Patient>, StoreError>;

    async fn create_patient(&self, patient: &NewPatient) -> Result<Patient, StoreError>;

    async fn find_patient(&self, id: i64) -> Result<Option<Patient>, StoreError>;

    /// Replace a patient's notes. Fails with [`StoreError::NotFound`] for an unknown id.
    async fn update_patient_notes(&self, id: i64, notes: &str) -> Result<Patient, StoreError>;

    async fn list_doctors(&self) -> Result<Vec<Doctor>, StoreError>;

    async fn find_doctor(&self, id: i64) -> Result<Option<Doctor>, StoreError>;

    /// Appointments ordered by date, earliest first.
    async fn list_appointments(&self) -> Result<Vec<AppointmentSummary>, StoreError>;

    /// Fails with [`StoreError::Constraint`] if the patient or doctor does not exist.
    async fn create_appointment(&self, appointment: &NewAppointment) -> Result<i64, StoreError>;

    /// Fails with [`StoreError::NotFound`] for an unknown id.
    async fn complete_appointment(&self, id: i64) -> Result<(), StoreError>;
}

/// The protected front-desk operations. Every method takes the caller's
/// [`Identity`], which only the token gate can produce for a request.
#[derive(Clone)]
pub struct Clinic {
    store: Arc<dyn ClinicStore>,
    notifier: Arc<dyn Notifier>,
    router: Option<Arc<dyn SpecialtyRouter>>,
}

impl Clinic {
    pub fn new(
        store: Arc<dyn ClinicStore>,
        notifier: Arc<dyn Notifier>,
        router: Option<Arc<dyn SpecialtyRouter>>,
    ) -> Self {
        Self {
            store,
            notifier,
            router,
        }
    }

    pub async fn list_patients(&self, _who: &Identity) -> Result<Vec<Patient>, ApiError> {
        Ok(self.store.list_patients().await?)
    }

    pub async fn create_patient(
        &self,
        who: &Identity,
        patient: &NewPatient,
    ) -> Result<Patient, ApiError> {
        if patient.name.trim().is_empty() {
            return Err(ApiError::InvalidInput("patient name is required"));
        }

        let created = self.store.create_patient(patient).await?;
        info!(patient_id = created.id, by = %who.username.0, "patient registered");
        Ok(created)
    }

    pub async fn update_patient_notes(
        &self,
        who: &Identity,
        id: i64,
        notes: &str,
    ) -> Result<Patient, ApiError> {
        let patient = self
            .store
            .update_patient_notes(id, notes)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => ApiError::NotFound("Patient"),
                e => e.into(),
            })?;
        info!(patient_id = id, by = %who.username.0, "patient notes updated");
        Ok(patient)
    }

    pub async fn list_doctors(&self, _who: &Identity) -> Result<Vec<Doctor>, ApiError> {
        Ok(self.store.list_doctors().await?)
    }

    pub async fn list_appointments(
        &self,
        _who: &Identity,
    ) -> Result<Vec<AppointmentSummary>, ApiError> {
        Ok(self.store.list_appointments().await?)
    }

    /// Book an appointment and text the patient a confirmation. A failed
    /// text is logged and does not undo the booking.
    pub async fn book_appointment(
        &self,
        who: &Identity,
        appointment: &NewAppointment,
    ) -> Result<i64, ApiError> {
        if appointment.appointment_date.trim().is_empty() {
            return Err(ApiError::InvalidInput("appointment date is required"));
        }

        let id = self
            .store
            .create_appointment(appointment)
            .await
            .map_err(|e| match e {
                StoreError::Constraint => ApiError::InvalidReference,
                e => e.into(),
            })?;
        info!(appointment_id = id, by = %who.username.0, "appointment booked");

        self.send_confirmation(appointment).await;

        Ok(id)
    }

    pub async fn complete_appointment(&self, who: &Identity, id: i64) -> Result<(), ApiError> {
        self.store
            .complete_appointment(id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => ApiError::NotFound("Appointment"),
                e => e.into(),
            })?;
        info!(appointment_id = id, by = %who.username.0, "appointment completed");
        Ok(())
    }

    /// Ask the LLM which specialty fits the symptoms, and list the doctors who practise it.
    pub async fn triage(&self, who: &Identity, symptoms: &str) -> Result<TriageOutcome, ApiError> {
        if symptoms.trim().is_empty() {
            return Err(ApiError::InvalidInput("symptoms are required"));
        }

        let router = self.router.as_ref().ok_or(ApiError::TriageUnavailable)?;

        let doctors = self.store.list_doctors().await?;
        let mut specialties: Vec<String> = doctors.iter().map(|d| d.specialty.clone()).collect();
        specialties.sort();
        specialties.dedup();

        let answer = router
            .route(symptoms, &specialties)
            .await
            .map_err(|source| ApiError::TriageFailed { source })?;
        let specialty = match_specialty(&answer, &specialties);

        info!(by = %who.username.0, %specialty, "triage routed");

        let doctors = doctors
            .into_iter()
            .filter(|d| d.specialty.eq_ignore_ascii_case(&specialty))
            .collect();

        Ok(TriageOutcome { specialty, doctors })
    }

    async fn send_confirmation(&self, appointment: &NewAppointment) {
        let patient = self.store.find_patient(appointment.patient_id).await;
        let doctor = self.store.find_doctor(appointment.doctor_id).await;

        let (patient, doctor) = match (patient, doctor) {
            (Ok(Some(patient)), Ok(Some(doctor))) => (patient, doctor),
            _ => {
                warn!("could not load appointment details for confirmation text");
                return;
            }
        };

        if patient.phone.trim().is_empty() {
            return;
        }

        let body = format!(
            "Hello {}, your appointment with {} ({}) is confirmed for {}.",
            patient.name, doctor.name, doctor.specialty, appointment.appointment_date
        );

        if let Err(e) = self.notifier.send(&patient.phone, &body).await {
            warn!(patient_id = patient.id, error = %e, "failed to send confirmation text");
        }
    }
}
