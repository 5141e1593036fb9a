//! Protected front-desk routes. Every route passes through [`with_auth`]
//! before its body is read or its handler runs.

use std::convert::Infallible;

use serde::{Deserialize, Serialize};
use warp::{path, Filter, Rejection, Reply};

use crate::{
    auth::Auth,
    clinic::{Clinic, NewAppointment, NewPatient},
    routes::{json_body, with_auth},
    types::Identity,
};

pub fn build_clinic_route_filter(
    auth: &Auth,
    clinic: &Clinic,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let list_patients = path!("api" / "patients")
        .and(warp::get())
        .and(with_auth(auth))
        .and(with_clinic(clinic.clone()))
        .and_then(list_patients);

    let create_patient = path!("api" / "patients")
        .and(warp::post())
        .and(with_auth(auth))
        .and(json_body())
        .and(with_clinic(clinic.clone()))
        .and_then(create_patient);

    let update_notes = path!("api" / "patients" / i64 / "notes")
        .and(warp::put())
        .and(with_auth(auth))
        .and(json_body())
        .and(with_clinic(clinic.clone()))
        .and_then(update_patient_notes);

    let list_doctors = path!("api" / "doctors")
        .and(warp::get())
        .and(with_auth(auth))
        .and(with_clinic(clinic.clone()))
        .and_then(list_doctors);

    let list_appointments = path!("api" / "appointments")
        .and(warp::get())
        .and(with_auth(auth))
        .and(with_clinic(clinic.clone()))
        .and_then(list_appointments);

    let book_appointment = path!("api" / "appointments")
        .and(warp::post())
        .and(with_auth(auth))
        .and(json_body())
        .and(with_clinic(clinic.clone()))
        .and_then(book_appointment);

    let complete_appointment = path!("api" / "appointments" / i64 / "complete")
        .and(warp::put())
        .and(with_auth(auth))
        .and(with_clinic(clinic.clone()))
        .and_then(complete_appointment);

    let triage = path!("api" / "triage")
        .and(warp::post())
        .and(with_auth(auth))
        .and(json_body())
        .and(with_clinic(clinic.clone()))
        .and_then(triage);

    list_patients
        .or(create_patient)
        .or(update_notes)
        .or(list_doctors)
        .or(list_appointments)
        .or(book_appointment)
        .or(complete_appointment)
        .or(triage)
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct NotesQuery {
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct TriageQuery {
    pub symptoms: String,
}

async fn list_patients(who: Identity, clinic: Clinic) -> Result<impl Reply, Rejection> {
    let patients = clinic.list_patients(&who).await?;
    Ok(warp::reply::json(&patients))
}

async fn create_patient(
    who: Identity,
    input: NewPatient,
    clinic: Clinic,
) -> Result<impl Reply, Rejection> {
    let patient = clinic.create_patient(&who, &input).await?;
    Ok(warp::reply::json(&patient))
}

async fn update_patient_notes(
    id: i64,
    who: Identity,
    input: NotesQuery,
    clinic: Clinic,
) -> Result<impl Reply, Rejection> {
    let patient = clinic.update_patient_notes(&who, id, &input.notes).await?;
    Ok(warp::reply::json(&patient))
}

async fn list_doctors(who: Identity, clinic: Clinic) -> Result<impl Reply, Rejection> {
    let doctors = clinic.list_doctors(&who).await?;
    Ok(warp::reply::json(&doctors))
}

async fn list_appointments(who: Identity, clinic: Clinic) -> Result<impl Reply, Rejection> {
    let appointments = clinic.list_appointments(&who).await?;
    Ok(warp::reply::json(&appointments))
}

async fn book_appointment(
    who: Identity,
    input: NewAppointment,
    clinic: Clinic,
) -> Result<impl Reply, Rejection> {
    clinic.book_appointment(&who, &input).await?;
    Ok(warp::reply::json(&MessageResponse {
        message: "Appointment booked successfully!",
    }))
}

async fn complete_appointment(
    id: i64,
    who: Identity,
    clinic: Clinic,
) -> Result<impl Reply, Rejection> {
    clinic.complete_appointment(&who, id).await?;
    Ok(warp::reply::json(&MessageResponse {
        message: "Appointment marked as completed!",
    }))
}

async fn triage(who: Identity, input: TriageQuery, clinic: Clinic) -> Result<impl Reply, Rejection> {
    let outcome = clinic.triage(&who, &input.symptoms).await?;
    Ok(warp::reply::json(&outcome))
}

fn with_clinic(clinic: Clinic) -> impl Filter<Extract = (Clinic,), Error = Infallible> + Clone {
    warp::any().map(move || clinic.clone())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Value};
    use warp::http::StatusCode;

    use super::*;
    use crate::{
        auth::AuthConfig,
        notify::LogNotifier,
        routes::handle_rejection,
        sqlite::SqliteStore,
        types::{UserID, Username},
    };

    fn setup() -> (Auth, Clinic, String) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let auth = Auth::new(AuthConfig::new("api-test-secret", store.clone()));
        let clinic = Clinic::new(store, Arc::new(LogNotifier), None);
        let token = auth
            .issue(&Identity {
                user_id: UserID(1),
                username: Username("frontdesk".into()),
            })
            .unwrap();
        (auth, clinic, format!("Bearer {}", token))
    }

    #[tokio::test]
    async fn every_route_is_gated() {
        let (auth, clinic, _) = setup();
        let routes = build_clinic_route_filter(&auth, &clinic).recover(handle_rejection);

        for (method, path) in [
            ("GET", "/api/patients"),
            ("POST", "/api/patients"),
            ("PUT", "/api/patients/1/notes"),
            ("GET", "/api/doctors"),
            ("GET", "/api/appointments"),
            ("POST", "/api/appointments"),
            ("PUT", "/api/appointments/1/complete"),
            ("POST", "/api/triage"),
        ] {
            let resp = warp::test::request()
                .method(method)
                .path(path)
                .reply(&routes)
                .await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{} {}", method, path);

            let resp = warp::test::request()
                .method(method)
                .path(path)
                .header("authorization", "Bearer forged.token.value")
                .reply(&routes)
                .await;
            assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{} {}", method, path);
        }
    }

    #[tokio::test]
    async fn front_desk_flow() {
        let (auth, clinic, bearer) = setup();
        let routes = build_clinic_route_filter(&auth, &clinic).recover(handle_rejection);

        let resp = warp::test::request()
            .method("POST")
            .path("/api/patients")
            .header("authorization", &bearer)
            .json(&json!({"name": "Ann Lee", "phone": "+15550001", "blood_group": "B+"}))
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let patient: Value = serde_json::from_slice(resp.body()).unwrap();
        let patient_id = patient["id"].as_i64().unwrap();

        let resp = warp::test::request()
            .method("PUT")
            .path(&format!("/api/patients/{}/notes", patient_id))
            .header("authorization", &bearer)
            .json(&json!({"notes": "dictated: persistent cough"}))
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = warp::test::request()
            .method("POST")
            .path("/api/appointments")
            .header("authorization", &bearer)
            .json(&json!({
                "patient_id": patient_id.to_string(),
                "doctor_id": 1,
                "appointment_date": "2026-02-01T09:30"
            }))
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = warp::test::request()
            .path("/api/appointments")
            .header("authorization", &bearer)
            .reply(&routes)
            .await;
        let appointments: Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(appointments[0]["patient_name"], "Ann Lee");
        assert_eq!(appointments[0]["status"], "Scheduled");
        let appointment_id = appointments[0]["id"].as_i64().unwrap();

        let resp = warp::test::request()
            .method("PUT")
            .path(&format!("/api/appointments/{}/complete", appointment_id))
            .header("authorization", &bearer)
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = warp::test::request()
            .path("/api/patients")
            .header("authorization", &bearer)
            .reply(&routes)
            .await;
        let patients: Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(patients[0]["notes"], "dictated: persistent cough");
    }

    #[tokio::test]
    async fn unknown_records_map_to_client_errors() {
        let (auth, clinic, bearer) = setup();
        let routes = build_clinic_route_filter(&auth, &clinic).recover(handle_rejection);

        let resp = warp::test::request()
            .method("PUT")
            .path("/api/appointments/77/complete")
            .header("authorization", &bearer)
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = warp::test::request()
            .method("POST")
            .path("/api/appointments")
            .header("authorization", &bearer)
            .json(&json!({"patient_id": 77, "doctor_id": 1, "appointment_date": "2026-02-01"}))
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = warp::test::request()
            .method("POST")
            .path("/api/triage")
            .header("authorization", &bearer)
            .json(&json!({"symptoms": "headache"}))
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
