//! Example: TCP echo server, one coroutine per connection
//!
//! Try it with `nc 127.0.0.1 8080`.

use coro::net::{Stream, TcpListener, TcpStream};

fn serve(stream: &TcpStream) -> coro::Result<()> {
    let mut buf = [0u8; 1024];

    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Ok(());
        }

        stream.write_all(&buf[..n])?;
    }
}

#[coro::main]
fn main() {
    let listener = TcpListener::bind("127.0.0.1:8080")?;
    println!("Listening on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = listener.accept()?;
        println!("Accepted {peer}");

        coro::start(move || {
            match serve(&stream) {
                Ok(()) => println!("{peer} disconnected"),
                // Only cancellation may leave a coroutine as an error
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => println!("{peer} failed: {err}"),
            }
            Ok(())
        })
        .detach();
    }
}
