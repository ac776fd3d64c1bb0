use actix_web::web;

mod checks;
mod health;
mod targets;


pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health::health_route)
        .service(targets::list_targets)
        .service(targets::create_target)
        .service(targets::get_target)
        .service(targets::update_target)
        .service(targets::delete_target)
        .service(targets::target_uptime)
        .service(targets::target_history)
        .service(checks::check_target)
        .service(checks::check_all);
}
