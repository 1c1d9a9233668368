use crate::runtime_config::RuntimeConfig;
use may::coroutine::JoinHandle;
use may_minihttp::{HttpServer as MiniHttpServer, HttpService};
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

/// Typed start/stop interface over may_minihttp's server for an
/// [`OpenApiService`](super::OpenApiService) (or any `HttpService`).
///
/// Starting applies the [`RuntimeConfig`] stack size to the coroutine
/// runtime, so connection coroutines get the same tuning as the procedure
/// workers.
pub struct HttpServer<T>(pub T);

/// Handle to a running server: readiness polling, shutdown, joining.
pub struct ServerHandle {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl ServerHandle {
    /// Address the listener is bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Poll until the listener accepts TCP connections or the deadline
    /// passes.
    pub fn wait_ready(&self) -> io::Result<()> {
        let deadline = Instant::now() + Duration::from_millis(250);
        while TcpStream::connect(self.addr).is_err() {
            if Instant::now() >= deadline {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"));
            }
            thread::sleep(Duration::from_millis(5));
        }
        Ok(())
    }

    /// Cancel the accept coroutine and wait for it to exit.
    pub fn stop(self) {
        info!(addr = %self.addr, "stopping http server");
        unsafe {
            self.handle.coroutine().cancel();
        }
        let _ = self.handle.join();
    }

    /// Block until the server exits on its own.
    pub fn join(self) -> std::thread::Result<()> {
        self.handle.join()
    }
}

impl<T> HttpServer<T>
where
    T: HttpService + Clone + Send + Sync + 'static,
{
    /// Start the server on the first address `addr` resolves to.
    ///
    /// # Errors
    ///
    /// Returns an error when the address resolves to nothing or the port
    /// cannot be bound.
    pub fn start<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        let addr = match addr.to_socket_addrs()?.next() {
            Some(addr) => addr,
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "address resolved to nothing",
                ))
            }
        };

        let config = RuntimeConfig::from_env();
        may::config().set_stack_size(config.stack_size);
        info!(
            addr = %addr,
            stack_size = config.stack_size,
            "starting http server"
        );

        let handle = MiniHttpServer(self.0).start(addr)?;
        Ok(ServerHandle { addr, handle })
    }
}
