//! Status and category vocabularies shared by the API and the database.
//!
//! Every enum round-trips through the short lowercase string stored in its
//! Varchar column. Transition rules for the trip-request lifecycle live here
//! so route handlers only deal with precondition errors.

use serde::{Deserialize, Serialize};

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(TripStatus {
    None => "none",
    Pending => "pending",
    Approved => "approved",
    Denied => "denied",
    Completed => "completed",
    Cancelled => "cancelled",
    Other => "other",
    Returned => "returned",
});

string_enum!(VehicleStatus {
    None => "none",
    Active => "active",
    Inactive => "inactive",
    Retired => "retired",
    Gifted => "gifted",
    Sold => "sold",
    Other => "other",
});

string_enum!(VehicleType {
    Unknown => "unknown",
    Car => "car",
    PassengerVan => "passenger_van",
    CargoVan => "cargo_van",
    Bus => "bus",
    CoachBus => "coach_bus",
    RoadBus => "road_bus",
    Truck => "truck",
    NonCdlBus => "non_cdl_bus",
    GolfCart => "golf_cart",
});

string_enum!(DriverStatus {
    None => "none",
    Active => "active",
    Inactive => "inactive",
    Retired => "retired",
});

string_enum!(KeyColor {
    None => "none",
    Red => "red",
    Blue => "blue",
    Green => "green",
    Yellow => "yellow",
    White => "white",
});

string_enum!(MaintenanceCategory {
    Unknown => "unknown",
    General => "general",
    Engine => "engine",
    Body => "body",
    Electrical => "electrical",
    Inspection => "inspection",
    Other => "other",
});

string_enum!(TripEvent {
    Created => "created",
    Edited => "edited",
    Deleted => "deleted",
    Pending => "pending",
    Approved => "approved",
    Denied => "denied",
    Finished => "finished",
    Cancelled => "cancelled",
    Archived => "archived",
});

string_enum!(VehicleEvent {
    Created => "created",
    Edited => "edited",
    Deleted => "deleted",
    MaintenanceCreated => "maintenance_created",
    MaintenanceEdited => "maintenance_edited",
    MaintenanceDeleted => "maintenance_deleted",
});

impl TripStatus {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Denied => "Denied",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
            Self::Other => "Other",
            Self::Returned => "Returned",
        }
    }

    /// Requests in a terminal rejection state cannot be edited any further.
    pub fn is_modifiable(&self) -> bool {
        !matches!(self, Self::Denied | Self::Completed | Self::Cancelled)
    }

    /// Completion is only reachable after the vehicle has come back.
    pub fn can_finalize(&self) -> bool {
        matches!(self, Self::Returned)
    }
}
