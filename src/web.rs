use actix_web::{App, HttpResponse, HttpServer, Responder, get};
use serde::Serialize;
use std::net::Ipv4Addr;

use tracing::info;

use crate::metrics::METRICS;

#[derive(Serialize)]
struct ProbeResp<'a> {
    status: &'a str,
}

/// Keep-alive target for hosting platforms that ping the service.
#[get("/")]
async fn index() -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body("OK - Discord Timer Bot")
}

#[get("/k8s/readyz")]
async fn readyz() -> impl Responder {
    if METRICS.is_ready() {
        HttpResponse::Ok().json(ProbeResp { status: "ok" })
    } else {
        HttpResponse::ServiceUnavailable().json(ProbeResp { status: "starting" })
    }
}

#[get("/k8s/livez")]
async fn livez() -> impl Responder {
    HttpResponse::Ok().json(ProbeResp { status: "ok" })
}

#[get("/k8s/metrics")]
async fn metrics() -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(METRICS.snapshot().render())
}

pub async fn run_http(port: u16) -> std::io::Result<()> {
    let bind_addr = (Ipv4Addr::UNSPECIFIED, port);
    let server = HttpServer::new(|| {
        App::new()
            .service(index)
            .service(readyz)
            .service(livez)
            .service(metrics)
    })
    .bind(bind_addr)?
    .workers(1) // lightweight
    .run();
    info!("HTTP listening on 0.0.0.0:{port}");
    server.await
}
