//! List the serial ports a tracking device could be attached to.

fn main() {
    env_logger::init();

    match emtrack::transport::list_ports() {
        Ok(ports) => {
            println!("Found {} serial port(s):", ports.len());
            for (i, port) in ports.iter().enumerate() {
                println!("  [{}] {}", i, port);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
