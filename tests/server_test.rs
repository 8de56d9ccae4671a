mod common;

use anyhow::Result;
use common::*;
use httpmock::prelude::*;
use partida_service::app::build_engine;
use partida_service::app::routes::{router, AppState};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;

async fn spawn_app(server: &MockServer) -> Result<SocketAddr> {
    let (engine, _) = build_engine(&config_for(server))?;
    let app = router(AppState {
        engine: Arc::new(engine),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Ok(addr)
}

#[tokio::test]
async fn test_fetch_abl_data_over_http() -> Result<()> {
    let upstream = MockServer::start_async().await;
    upstream.mock(|when, then| {
        when.method(GET).path(CADASTRE_PATH);
        then.status(200).json_body(json!({"pdamatriz": "1234567"}));
    });
    let brevo = upstream.mock(|when, then| {
        when.method(POST).path(BREVO_PATH);
        then.status(201).json_body(json!({"messageId": "<m@relay>"}));
    });

    let addr = spawn_app(&upstream).await?;
    let response = reqwest::Client::new()
        .post(format!("http://{}/fetch-abl-data", addr))
        .json(&json!({"lat": LAT, "lng": LNG, "email": "vecino@example.com"}))
        .send()
        .await?;

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(
        body,
        json!({"message": "Email enviado con éxito", "pdamatriz": "1234567"})
    );
    brevo.assert_hits(1);
    Ok(())
}

#[tokio::test]
async fn test_verification_over_http() -> Result<()> {
    let upstream = MockServer::start_async().await;
    upstream.mock(|when, then| {
        when.method(GET).path(CADASTRE_PATH);
        then.status(200).json_body(json!({"pdamatriz": "7654321"}));
    });
    upstream.mock(|when, then| {
        when.method(GET).path(DEBT_PATH);
        then.status(200).body(r#"{"statusCode":402}"#);
    });

    let addr = spawn_app(&upstream).await?;
    let body: Value = reqwest::Client::new()
        .post(format!("http://{}/verification", addr))
        .json(&json!({"lat": -34.6037, "lng": -58.3816}))
        .send()
        .await?
        .json()
        .await?;

    assert_eq!(body, json!({"message": "La partida no existe"}));
    Ok(())
}

#[tokio::test]
async fn test_missing_email_is_rejected() -> Result<()> {
    let upstream = MockServer::start_async().await;
    let cadastre = upstream.mock(|when, then| {
        when.method(GET).path(CADASTRE_PATH);
        then.status(200).json_body(json!({"pdamatriz": "1"}));
    });

    let addr = spawn_app(&upstream).await?;
    let response = reqwest::Client::new()
        .post(format!("http://{}/fetch-abl-data", addr))
        .json(&json!({"lat": LAT, "lng": LNG}))
        .send()
        .await?;

    assert_eq!(response.status(), 400);
    cadastre.assert_hits(0);
    Ok(())
}
