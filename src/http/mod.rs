// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

//! HTTP front end: a fixed pool of worker threads sharing one
//! `tiny_http` listener.

pub mod reply;
pub mod routes;

use std::io::{Cursor, Read};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use datapond_lake::Lake;
use log::{debug, info, warn};
use tiny_http::{Header, Request, Response, Server, StatusCode};

use crate::config::DatapondConfig;
use crate::error::{DatapondError, DatapondResult};
use reply::Reply;

/// Entry point for serving a [`Lake`] over HTTP.
pub struct DatapondServer;

impl DatapondServer {
    /// Bind the configured address and start `config.workers` request
    /// threads.
    pub fn start(config: &DatapondConfig, lake: Arc<Lake>) -> DatapondResult<ServerHandle> {
        let addr = config.socket_addr()?;
        let server = Server::http(addr).map_err(|err| DatapondError::Bind {
            addr: addr.to_string(),
            reason: err.to_string(),
        })?;
        let bound = server.server_addr().to_ip().ok_or_else(|| DatapondError::Bind {
            addr: addr.to_string(),
            reason: "listener has no IP address".into(),
        })?;
        let server = Arc::new(server);
        let stop = Arc::new(AtomicBool::new(false));
        let mut handle = ServerHandle {
            addr: bound,
            server: server.clone(),
            stop: stop.clone(),
            workers: Vec::with_capacity(config.workers),
        };
        for id in 0..config.workers {
            let server = server.clone();
            let lake = lake.clone();
            let stop = stop.clone();
            let worker = thread::Builder::new()
                .name(format!("datapond-worker-{}", id))
                .spawn(move || serve(&server, &lake, &stop))?;
            handle.workers.push(worker);
        }
        info!("listening on http://{} with {} workers", bound, config.workers);
        Ok(handle)
    }
}

/// Running server. Dropping it stops the workers.
pub struct ServerHandle {
    addr: SocketAddr,
    server: Arc<Server>,
    stop: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    /// Address actually bound; differs from the configured one for port 0.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Block until every worker exits.
    pub fn join(mut self) {
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("request worker panicked");
            }
        }
    }

    /// Stop accepting requests and wait for in-flight ones to finish.
    pub fn shutdown(mut self) {
        self.stop_workers();
    }

    fn stop_workers(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.stop.store(true, Ordering::SeqCst);
        for _ in &self.workers {
            self.server.unblock();
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("request worker panicked");
            }
        }
        info!("server on {} stopped", self.addr);
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop_workers();
    }
}

fn serve(server: &Server, lake: &Lake, stop: &AtomicBool) {
    loop {
        match server.recv() {
            Ok(request) => respond(lake, request),
            Err(_) if stop.load(Ordering::SeqCst) => break,
            Err(err) => warn!("accept failed: {}", err),
        }
    }
}

fn respond(lake: &Lake, mut request: Request) {
    let method = request.method().clone();
    let target = request.url().to_string();
    let headers: Vec<(String, String)> = request
        .headers()
        .iter()
        .map(|h| (h.field.to_string(), h.value.to_string()))
        .collect();
    let mut body = Vec::new();
    let reply = match request.as_reader().read_to_end(&mut body) {
        Ok(_) => routes::handle(lake, &method, &target, &headers, &body),
        Err(err) => {
            warn!("cannot read body of {} {}: {}", method, target, err);
            Reply::error(400, "InvalidInput", "The request body could not be read.")
        }
    };
    if reply.status >= 500 {
        warn!("{} {} -> {}", method, target, reply.status);
    } else {
        debug!("{} {} -> {}", method, target, reply.status);
    }
    if let Err(err) = request.respond(into_response(reply)) {
        debug!("client went away: {}", err);
    }
}

fn into_response(reply: Reply) -> Response<Cursor<Vec<u8>>> {
    let mut response = Response::from_data(reply.body).with_status_code(StatusCode(reply.status));
    for (name, value) in &reply.headers {
        match Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            Ok(header) => response.add_header(header),
            Err(()) => warn!("dropping unencodable header {}", name),
        }
    }
    response
}
