use clap::Parser;

use redlink::{Collect, Command, Connection, Request};

#[derive(Parser, Debug)]
struct Args {
    /// The server address to connect to
    #[arg(short, long, default_value = "127.0.0.1:6379")]
    addr: String,

    /// Command followed by its arguments, e.g. `GET key`
    #[arg(required = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> redlink::Result<()> {
    tracing_subscriber::fmt().init();

    let args = Args::parse();
    let cmd = Command::from(args.command[0].as_str());

    let mut req = Request::new();
    req.push(cmd.clone(), &args.command[1..]);

    let conn = Connection::new();
    let runner = tokio::spawn({
        let conn = conn.clone();
        let addr = args.addr.clone();
        async move { conn.run_tcp(addr).await }
    });

    // Subscribe-style commands answer with a push, so the receiver has to
    // be registered before the request hits the wire.
    let push = if cmd.has_push_response() {
        let conn = conn.clone();
        let task = tokio::spawn(async move { conn.receive(Collect::new()).await });
        tokio::task::yield_now().await;
        Some(task)
    } else {
        None
    };

    let reply = conn.exec(&req, Collect::new()).await?;
    if let Some(frame) = reply.into_frame() {
        println!("{}", frame);
    }

    if let Some(task) = push {
        if let Ok(received) = task.await {
            if let Some(frame) = received?.into_frame() {
                println!("{}", frame);
            }
        }
    }

    runner.abort();
    Ok(())
}
