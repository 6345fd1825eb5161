use std::{error::Error, sync::Arc, time::Duration};

use cancha::{
    domain::{
        auth::{AuthService, AuthWatcher, Credentials, Registration, SessionStore, User},
        booking::{BookingError, BookingSession},
        core::{
            average_rating, format_time, parse_time, CourtService, DailySchedule,
            FeedbackService, NewFeedback, ReservationService, WeatherService,
        },
    },
    infrastructure::{
        auth::{FirebaseIdentityProvider, HttpAuthGateway},
        core::{
            HttpCourtRepository, HttpFeedbackRepository, HttpReservationRepository,
            HttpWeatherRepository,
        },
        ApiClient, FileSessionStore,
    },
    CanchaConfig,
};
use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use tracing::{error, info, Level};

#[derive(Parser)]
#[command(name = "cancha", version, about = "Reserva de canchas deportivas")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// メールアドレスとパスワードでログイン
    Login { email: String, password: String },
    /// 新規登録
    Register {
        name: String,
        email: String,
        password: String,
        #[arg(long)]
        phone: Option<String>,
    },
    /// Google のIDトークンでログイン
    GoogleLogin {
        id_token: String,
        #[arg(long)]
        access_token: Option<String>,
    },
    Logout,
    Whoami,
    /// コート一覧（平均評価付き）
    Courts,
    Court { id: u64 },
    /// 指定日の空き枠と天気
    Slots { court: u64, date: NaiveDate },
    Book {
        court: u64,
        date: NaiveDate,
        #[arg(value_parser = parse_time)]
        time: NaiveTime,
    },
    /// 自分の予約
    Reservations,
    Cancel { id: u64 },
    Feedback { court: u64 },
    /// 予約を評価する
    Rate {
        reservation: u64,
        rating: u8,
        #[arg(long)]
        comment: Option<String>,
    },
    DeleteFeedback { id: u64 },
    Weather { date: NaiveDate },
    /// 認証状態の変化を監視する
    Watch,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    match CanchaConfig::load() {
        Ok(config) => {
            tracing_subscriber::fmt()
                .with_max_level(Level::from(&config.logger.level))
                .init();
            if let Err(error) = run(&config, cli.command).await {
                error!("アプリケーションエラー: {}", error);
                eprintln!("{}", error);
            }
        }
        Err(error) => {
            tracing_subscriber::fmt::init();
            error!("アプリケーションエラー: {}", error)
        }
    }
}

async fn run(config: &CanchaConfig, command: Command) -> Result<(), Box<dyn Error>> {
    let store: Arc<dyn SessionStore> = Arc::new(FileSessionStore::new(&config.storage.path));
    let client = ApiClient::from_config(config, store.clone())?;
    let auth = AuthService::new(
        HttpAuthGateway::new(client.clone()),
        FirebaseIdentityProvider::from_config(config)?,
        store.clone(),
    );
    let courts = CourtService::new(HttpCourtRepository::new(client.clone()));
    let reservations = ReservationService::new(HttpReservationRepository::new(client.clone()));
    let feedbacks = FeedbackService::new(HttpFeedbackRepository::new(client.clone()));
    let weather = WeatherService::new(HttpWeatherRepository::new(client));
    let schedule = DailySchedule::hourly(config.schedule.open_hour, config.schedule.close_hour);

    match command {
        Command::Login { email, password } => {
            let session = auth.login(&Credentials { email, password }).await?;
            print_welcome(session.user.as_ref());
        }
        Command::Register {
            name,
            email,
            password,
            phone,
        } => {
            let session = auth
                .register(&Registration {
                    name,
                    email,
                    password,
                    phone,
                })
                .await?;
            print_welcome(session.user.as_ref());
        }
        Command::GoogleLogin {
            id_token,
            access_token,
        } => {
            let session = auth
                .login_with_google(&id_token, access_token.as_deref())
                .await?;
            print_welcome(session.user.as_ref());
        }
        Command::Logout => {
            auth.logout().await?;
            println!("Sesión cerrada");
        }
        Command::Whoami => {
            let authenticated = auth.is_authenticated().await;
            match auth.current_user().await? {
                Some(user) => println!("{} <{}> (id {})", user.name, user.email, user.id),
                None if authenticated => println!("Sesión iniciada"),
                None => println!("No has iniciado sesión"),
            }
        }
        Command::Courts => {
            let list = courts.list().await;
            let ids: Vec<_> = list.iter().map(|c| c.id).collect();
            let averages = feedbacks.averages_for_courts(&ids).await;
            for court in &list {
                let average = averages.get(&court.id).copied().unwrap_or_default();
                println!(
                    "{:>4} {:<8} {:<24} {:<12} {}/hora ★ {:.1}",
                    court.id, court.code, court.name, court.sport, court.price, average
                );
            }
        }
        Command::Court { id } => {
            let court = courts.get(id.into()).await?;
            let average = feedbacks.average_for_court(court.id).await;
            println!("{} ({})", court.name, court.code);
            println!("Deporte: {}", court.sport);
            println!("Precio: {}/hora", court.price);
            println!("Color: {}", court.color);
            if !court.image.is_empty() {
                println!("Imagen: {}", court.image);
            }
            println!("Calificación: ★ {:.1}", average);
        }
        Command::Slots { court, date } => {
            let court = courts.get(court.into()).await?;
            let mut booking = BookingSession::new(court, schedule, &reservations, &weather);
            booking.select_date(date).await;
            if let Some(forecast) = booking.forecast() {
                println!(
                    "{} {} {:.0}°/{:.0}° lluvia {:.0}%",
                    forecast.icon(),
                    forecast.description(),
                    forecast.max_temperature,
                    forecast.min_temperature,
                    forecast.precipitation_probability
                );
            }
            for slot in booking.slots() {
                let mark = if slot.available { "libre" } else { "ocupado" };
                println!("{} {}", slot.label(), mark);
            }
        }
        Command::Book { court, date, time } => {
            let user = auth.current_user().await?;
            let court = courts.get(court.into()).await?;
            let mut booking = BookingSession::new(court, schedule, &reservations, &weather);
            booking.select_date(date).await;
            booking.select_time(time)?;
            booking.confirm(user.as_ref()).await?;
            println!(
                "Reserva confirmada: {} {} {}",
                booking.court().name,
                date,
                format_time(&time)
            );
        }
        Command::Reservations => {
            let user = auth.current_user().await?;
            let user = require_user(&user)?;
            for reservation in reservations.list_for_user(user.id).await {
                let price = reservation
                    .total_price
                    .map(|p| p.to_string())
                    .unwrap_or_default();
                println!(
                    "{:>4} cancha {} {} {} {} {}",
                    reservation.id,
                    reservation.court_id,
                    reservation.date,
                    format_time(&reservation.time),
                    price,
                    reservation.status
                );
            }
        }
        Command::Cancel { id } => {
            reservations.cancel(id.into()).await?;
            println!("Reserva {} cancelada", id);
        }
        Command::Feedback { court } => {
            let list = feedbacks.list_for_court(court.into()).await;
            println!(
                "★ {:.1} ({} valoraciones)",
                average_rating(&list),
                list.len()
            );
            for feedback in &list {
                println!(
                    "{} {} {}: {}",
                    "★".repeat(feedback.rating as usize),
                    feedback.date,
                    feedback.user_name.as_deref().unwrap_or("Anónimo"),
                    feedback.comment.as_deref().unwrap_or_default()
                );
            }
        }
        Command::Rate {
            reservation,
            rating,
            comment,
        } => {
            let user = auth.current_user().await?;
            let user = require_user(&user)?;
            let feedback = NewFeedback::new(reservation.into(), user.id, rating, comment)?;
            feedbacks.submit(&feedback).await?;
            println!("¡Gracias por tu valoración!");
        }
        Command::DeleteFeedback { id } => {
            feedbacks.delete(id.into()).await?;
            println!("Valoración {} eliminada", id);
        }
        Command::Weather { date } => {
            let forecast = weather.forecast(Some(date)).await?;
            println!(
                "{} {} {} máx {:.1}° mín {:.1}° lluvia {:.0}%",
                forecast.date,
                forecast.icon(),
                forecast.description(),
                forecast.max_temperature,
                forecast.min_temperature,
                forecast.precipitation_probability
            );
        }
        Command::Watch => {
            let interval = Duration::from_millis(config.auth.poll_interval_ms);
            let watcher = AuthWatcher::spawn(store, interval).await;
            let mut receiver = watcher.subscribe();
            println!("Autenticado: {}", watcher.is_authenticated());
            loop {
                tokio::select! {
                    changed = receiver.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let authenticated = *receiver.borrow();
                        println!("Autenticado: {}", authenticated);
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("監視を終了");
                        break;
                    }
                }
            }
        }
    }
    Ok(())
}

fn require_user(user: &Option<User>) -> Result<&User, BookingError> {
    user.as_ref().ok_or(BookingError::NotAuthenticated)
}

fn print_welcome(user: Option<&User>) {
    match user {
        Some(user) => println!("Bienvenido, {}", user.name),
        None => println!("Sesión iniciada"),
    }
}
