use chrono::{NaiveDate, NaiveTime};
use derive_more::{Display, Error};
use tracing::{info, warn};

use crate::domain::{
    auth::User,
    core::{
        format_time, Court, DailySchedule, NewReservation, ReservationRepository,
        ReservationService, TimeSlot, Weather, WeatherRepository, WeatherService,
    },
    ApiError,
};

/// 予約画面の操作エラー
#[derive(Debug, Display, Error)]
pub enum BookingError {
    /// 日付が選択されていない
    #[display(fmt = "Por favor selecciona fecha y hora")]
    DateRequired,
    /// 時刻が選択されていない
    #[display(fmt = "Por favor selecciona fecha y hora")]
    TimeRequired,
    /// ログインしていない
    #[display(fmt = "Debes iniciar sesión")]
    NotAuthenticated,
    /// 候補に無い、または予約済みの時刻
    #[display(fmt = "Horario no disponible: {}", _0)]
    SlotUnavailable(#[error(not(source))] String),
    /// 予約の作成に失敗した
    #[display(fmt = "{}", _0)]
    Api(#[error(source)] ApiError),
}

impl From<ApiError> for BookingError {
    fn from(value: ApiError) -> Self {
        BookingError::Api(value)
    }
}

/// 1つのコートに対する予約画面の状態
///
/// 日付を選ぶたびに天気と空き状況を取り直し、予約成功後は空き状況を再取得して
/// 時刻の選択を解除する。予約済み時刻の確認と作成は不可分ではない。
pub struct BookingSession<'a, R, W> {
    court: Court,
    schedule: DailySchedule,
    reservations: &'a ReservationService<R>,
    weather: &'a WeatherService<W>,
    selected_date: Option<NaiveDate>,
    selected_time: Option<NaiveTime>,
    slots: Vec<TimeSlot>,
    forecast: Option<Weather>,
}

impl<'a, R, W> BookingSession<'a, R, W>
where
    R: ReservationRepository,
    W: WeatherRepository,
{
    pub fn new(
        court: Court,
        schedule: DailySchedule,
        reservations: &'a ReservationService<R>,
        weather: &'a WeatherService<W>,
    ) -> Self {
        Self {
            court,
            schedule,
            reservations,
            weather,
            selected_date: None,
            selected_time: None,
            slots: Vec::new(),
            forecast: None,
        }
    }

    pub fn court(&self) -> &Court {
        &self.court
    }

    pub fn selected_date(&self) -> Option<NaiveDate> {
        self.selected_date
    }

    pub fn selected_time(&self) -> Option<NaiveTime> {
        self.selected_time
    }

    pub fn slots(&self) -> &[TimeSlot] {
        &self.slots
    }

    pub fn forecast(&self) -> Option<&Weather> {
        self.forecast.as_ref()
    }

    /// 日付を選択し、天気と空き状況を並行して読み込む
    pub async fn select_date(&mut self, date: NaiveDate) {
        self.selected_date = Some(date);
        self.selected_time = None;
        let (forecast, slots) = tokio::join!(
            self.weather.forecast(Some(date)),
            Self::load_slots(self.reservations, &self.schedule, &self.court, date)
        );
        self.forecast = match forecast {
            Ok(weather) => Some(weather),
            Err(e) => {
                warn!("天気を表示できません fecha={}: {}", date, e);
                None
            }
        };
        self.slots = slots;
    }

    /// 空いている枠だけ選択できる
    pub fn select_time(&mut self, time: NaiveTime) -> Result<(), BookingError> {
        if self.selected_date.is_none() {
            return Err(BookingError::DateRequired);
        }
        match self.slots.iter().find(|s| s.time == time) {
            Some(slot) if slot.available => {
                self.selected_time = Some(time);
                Ok(())
            }
            _ => Err(BookingError::SlotUnavailable(format_time(&time))),
        }
    }

    /// 選択中の枠で予約を作成する。料金は現在のコート料金をコピーする
    pub async fn confirm(
        &mut self,
        user: Option<&User>,
    ) -> Result<serde_json::Value, BookingError> {
        let date = self.selected_date.ok_or(BookingError::DateRequired)?;
        let time = self.selected_time.ok_or(BookingError::TimeRequired)?;
        let user = user.ok_or(BookingError::NotAuthenticated)?;
        let reservation = NewReservation::new(user.id, self.court.id, date, time, self.court.price);
        let created = self.reservations.create(&reservation).await?;
        info!(
            "予約完了 cancha={} fecha={} hora={}",
            self.court.id,
            date,
            format_time(&time)
        );
        self.refresh().await;
        self.selected_time = None;
        Ok(created)
    }

    /// 選択中の日付の空き状況を取り直す
    pub async fn refresh(&mut self) {
        if let Some(date) = self.selected_date {
            self.slots =
                Self::load_slots(self.reservations, &self.schedule, &self.court, date).await;
        }
    }

    async fn load_slots(
        reservations: &ReservationService<R>,
        schedule: &DailySchedule,
        court: &Court,
        date: NaiveDate,
    ) -> Vec<TimeSlot> {
        let booked = reservations.booked_times(court.id, date).await;
        schedule.availability(&booked)
    }
}
