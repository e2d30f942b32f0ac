pub mod join;
pub mod room;
pub mod user;

pub use join::{JoinCredential, JoinDescriptor, PresenceInfo, RoomParticipants};
pub use room::{
    CreateMeetingRequest, JoinPolicy, MeetingCategory, NewRoom, RecentMeetingsQuery, Room,
    RoomSummary, RoomUpdate, UpdateMeetingRequest,
};
pub use user::{
    normalize_email, AuthResponse, Claims, LoginRequest, OtpRequest, RefreshRequest,
    RegisterRequest, TokenPair, TokenType, User, UserProfile, VerifyOtpRequest,
};
