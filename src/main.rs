fn main() {
    if let Err(err) = svg_banner_renderer::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
